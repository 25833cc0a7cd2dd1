use crate::exchange::{export_json, parse_import_document, write_json, write_subject_csv};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_subject, store_mut};
use crate::ipc::params::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_export_json(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let out_path = optional_str(req, "outPath")?;
    let classes = store.export_data();

    match out_path {
        Some(p) => {
            let path = PathBuf::from(p);
            write_json(&path, &classes)
                .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
            Ok(json!({ "path": path.to_string_lossy(), "classCount": classes.len() }))
        }
        None => {
            let text = export_json(&classes)
                .map_err(|e| HandlerErr::new("server_error", format!("{e:#}")))?;
            Ok(json!({ "text": text, "classCount": classes.len() }))
        }
    }
}

/// Replaces all classes with the document's. A rejected document leaves
/// the gradebook untouched.
fn handle_import_json(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let text = match (optional_str(req, "inPath")?, optional_str(req, "text")?) {
        (Some(p), _) => std::fs::read_to_string(p).map_err(|e| {
            HandlerErr::new("io_failed", format!("failed to read {}: {}", p, e))
                .with_details(json!({ "inPath": p }))
        })?,
        (None, Some(t)) => t.to_string(),
        (None, None) => return Err(HandlerErr::bad_params("missing inPath or text")),
    };

    let classes = parse_import_document(&text).map_err(|rejected| {
        tracing::warn!(code = rejected.code, message = %rejected.message, "import rejected");
        HandlerErr::new(rejected.code, rejected.message)
    })?;
    let count = classes.len();
    store
        .import_data(classes)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({
        "classCount": count,
        "selectedClassId": store.selected_class().map(|c| c.id.clone()),
    }))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let out_path = PathBuf::from(required_str(req, "outPath")?);
    let (class, subject) = find_subject(store, class_id, subject_id)?;

    let rows = write_subject_csv(&out_path, class, subject)
        .map_err(|e| HandlerErr::new("io_failed", format!("{e:#}")))?;
    Ok(json!({ "path": out_path.to_string_lossy(), "rowCount": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "exchange.exportJson" => handle_export_json(state, req),
        "exchange.importJson" => handle_import_json(state, req),
        "exchange.exportCsv" => handle_export_csv(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
