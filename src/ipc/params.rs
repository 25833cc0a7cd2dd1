use crate::calc::{is_valid_grade, parse_grade, round_off_2_decimals, MAX_GRADE, MIN_GRADE};
use crate::ipc::error::HandlerErr;
use crate::ipc::types::Request;
use chrono::NaiveDate;
use serde_json::json;

pub fn required_str<'a>(req: &'a Request, key: &str) -> Result<&'a str, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Result<Option<&'a str>, HandlerErr> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string or null", key))),
    }
}

/// Trimmed, non-empty text.
pub fn required_name(req: &Request, key: &str) -> Result<String, HandlerErr> {
    let name = required_str(req, key)?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(name)
}

/// Finite and strictly positive. Defaults to 1 when absent.
pub fn weight(req: &Request) -> Result<f64, HandlerErr> {
    let Some(raw) = req.params.get("weight") else {
        return Ok(1.0);
    };
    let Some(w) = raw.as_f64() else {
        return Err(HandlerErr::bad_params("weight must be a number"));
    };
    if !(w.is_finite() && w > 0.0) {
        return Err(HandlerErr::bad_params("weight must be > 0").with_details(json!({ "weight": w })));
    }
    Ok(w)
}

/// Optional `YYYY-MM-DD` exam date; empty text counts as no date.
pub fn exam_date(req: &Request) -> Result<Option<String>, HandlerErr> {
    let Some(raw) = optional_str(req, "date")? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| Some(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| {
            HandlerErr::bad_params("date must be YYYY-MM-DD").with_details(json!({ "date": raw }))
        })
}

/// Grade to store: numeric `value` (or null to clear), or grade `text` as
/// typed by the user.
pub fn grade_value(req: &Request) -> Result<Option<f64>, HandlerErr> {
    if let Some(text) = optional_str(req, "text")? {
        let text = text.trim();
        if !is_valid_grade(text) {
            return Err(HandlerErr::bad_params(format!(
                "\"{}\" is not a valid grade ({}-{})",
                text, MIN_GRADE, MAX_GRADE
            ))
            .with_details(json!({ "text": text })));
        }
        return Ok(parse_grade(text));
    }

    match req.params.get("value") {
        None => Err(HandlerErr::bad_params("missing value or text")),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(n) = v.as_f64() else {
                return Err(HandlerErr::bad_params("value must be a number or null"));
            };
            if !(MIN_GRADE..=MAX_GRADE).contains(&n) {
                return Err(HandlerErr::bad_params(format!(
                    "grade must be between {} and {}",
                    MIN_GRADE, MAX_GRADE
                ))
                .with_details(json!({ "value": n })));
            }
            Ok(Some(round_off_2_decimals(n)))
        }
    }
}
