use crate::model::{Grade, SchoolClass, Subject};
use serde::Serialize;

pub const MIN_GRADE: f64 = 1.0;
pub const MAX_GRADE: f64 = 6.0;

/// Two-decimal rounding applied to entered grades: `round(100*x) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn get_grade(grades: &[Grade], student_id: &str, exam_id: &str) -> Option<f64> {
    grades
        .iter()
        .find(|g| g.student_id == student_id && g.exam_id == exam_id)
        .map(|g| g.value)
}

/// Weighted mean over the items that carry a value.
///
/// Items without a value contribute neither to the sum nor to the
/// denominator. Items whose weight is not a positive finite number are
/// skipped. `None` when nothing contributed.
pub fn weighted_mean<T, I, W, V>(items: I, weight: W, value: V) -> Option<f64>
where
    I: IntoIterator<Item = T>,
    W: Fn(&T) -> f64,
    V: Fn(&T) -> Option<f64>,
{
    let mut weighted_sum = 0.0_f64;
    let mut total_weight = 0.0_f64;

    for item in items {
        let w = weight(&item);
        if !(w.is_finite() && w > 0.0) {
            continue;
        }
        let Some(v) = value(&item) else {
            continue;
        };
        weighted_sum += v * w;
        total_weight += w;
    }

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}

pub fn category_average(subject: &Subject, student_id: &str, category_id: &str) -> Option<f64> {
    weighted_mean(
        subject.exams_in(category_id),
        |e| e.weight,
        |e| get_grade(&subject.grades, student_id, &e.id),
    )
}

pub fn final_grade(subject: &Subject, student_id: &str) -> Option<f64> {
    weighted_mean(
        subject.categories.iter(),
        |c| c.weight,
        |c| category_average(subject, student_id, &c.id),
    )
}

pub fn format_grade(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", round_off_2_decimals(v)),
        None => "-".to_string(),
    }
}

/// Tendency notation: the fractional part is bucketed at eighths,
/// intervals closed on the left.
pub fn format_final_grade(value: Option<f64>) -> String {
    let Some(v) = value else {
        return "-".to_string();
    };
    let base = v.floor();
    let decimal = v - base;
    let base = base as i64;

    if decimal < 0.125 {
        format!("{}", base)
    } else if decimal < 0.375 {
        format!("{}-", base)
    } else if decimal < 0.625 {
        format!("{}-{}", base, base + 1)
    } else if decimal < 0.875 {
        format!("{}+", base + 1)
    } else {
        format!("{}", base + 1)
    }
}

fn is_clear_marker(text: &str) -> bool {
    text.is_empty() || text == "-"
}

/// Length of the longest leading `[+-]digits[.digits][e[+-]digits]` run.
/// A lone sign or dot is not a number.
fn numeric_prefix_len(s: &[u8]) -> usize {
    let digits_from = |mut i: usize| {
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        i
    };

    let mut i = 0;
    if matches!(s.first(), Some(b'+' | b'-')) {
        i = 1;
    }
    let int_end = digits_from(i);
    let mut end = int_end;
    let mut mantissa_digits = int_end - i;
    if s.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - (end + 1);
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(s.get(end), Some(b'e' | b'E')) {
        let mut j = end + 1;
        if matches!(s.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            end = exp_end;
        }
    }
    end
}

/// Reads the leading number and ignores whatever follows it, so "2abc"
/// is 2 and "1.5." is 1.5. The first `,` counts as the decimal point.
fn parse_decimal(text: &str) -> Option<f64> {
    let normalized = text.trim().replacen(',', ".", 1);
    let len = numeric_prefix_len(normalized.as_bytes());
    if len == 0 {
        return None;
    }
    normalized[..len].parse::<f64>().ok()
}

fn in_grade_range(v: f64) -> bool {
    (MIN_GRADE..=MAX_GRADE).contains(&v)
}

/// Accepts the clear markers `""` and `"-"`, or a decimal in [1, 6] written
/// with either `.` or `,`.
pub fn is_valid_grade(text: &str) -> bool {
    if is_clear_marker(text) {
        return true;
    }
    parse_decimal(text).map(in_grade_range).unwrap_or(false)
}

/// Parse failures and clear markers both map to `None`; use
/// [`is_valid_grade`] to tell them apart.
pub fn parse_grade(text: &str) -> Option<f64> {
    if is_clear_marker(text) {
        return None;
    }
    let v = parse_decimal(text)?;
    if !in_grade_range(v) {
        return None;
    }
    Some(round_off_2_decimals(v))
}

/// Integer display percentage of `weight` among siblings summing to `total`.
pub fn weight_percent(weight: f64, total: f64) -> i64 {
    if total > 0.0 {
        ((weight / total) * 100.0).round() as i64
    } else {
        0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCategory {
    pub category_id: String,
    pub name: String,
    pub weight: f64,
    pub percent: i64,
    pub exam_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetExam {
    pub exam_id: String,
    pub name: String,
    pub category_id: String,
    pub weight: f64,
    pub percent: i64,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetCategoryAverage {
    pub category_id: String,
    pub value: Option<f64>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub student_id: String,
    pub display_name: String,
    /// Aligned with [`SubjectSheet::exams`].
    pub grades: Vec<Option<f64>>,
    pub category_averages: Vec<SheetCategoryAverage>,
    pub final_value: Option<f64>,
    pub final_text: String,
    pub final_tendency: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSheet {
    pub class_id: String,
    pub subject_id: String,
    pub subject_name: String,
    pub categories: Vec<SheetCategory>,
    pub exams: Vec<SheetExam>,
    pub rows: Vec<SheetRow>,
}

/// Grade sheet model for one subject: every student row with its derived
/// averages. Exams are listed grouped by category, in category order;
/// exams whose category is missing are not shown.
pub fn compute_subject_sheet(class: &SchoolClass, subject: &Subject) -> SubjectSheet {
    let category_total: f64 = subject.categories.iter().map(|c| c.weight).sum();

    let mut categories = Vec::with_capacity(subject.categories.len());
    let mut exams = Vec::with_capacity(subject.exams.len());
    for c in &subject.categories {
        let exam_total: f64 = subject.exams_in(&c.id).map(|e| e.weight).sum();
        let mut exam_ids = Vec::new();
        for e in subject.exams_in(&c.id) {
            exam_ids.push(e.id.clone());
            exams.push(SheetExam {
                exam_id: e.id.clone(),
                name: e.name.clone(),
                category_id: c.id.clone(),
                weight: e.weight,
                percent: weight_percent(e.weight, exam_total),
                date: e.date.clone(),
            });
        }
        categories.push(SheetCategory {
            category_id: c.id.clone(),
            name: c.name.clone(),
            weight: c.weight,
            percent: weight_percent(c.weight, category_total),
            exam_ids,
        });
    }

    let rows = class
        .students
        .iter()
        .map(|s| {
            let grades = exams
                .iter()
                .map(|e| get_grade(&subject.grades, &s.id, &e.exam_id))
                .collect();
            let category_averages = subject
                .categories
                .iter()
                .map(|c| {
                    let value = category_average(subject, &s.id, &c.id);
                    SheetCategoryAverage {
                        category_id: c.id.clone(),
                        value,
                        text: format_grade(value),
                    }
                })
                .collect();
            let final_value = final_grade(subject, &s.id);
            SheetRow {
                student_id: s.id.clone(),
                display_name: s.display_name(),
                grades,
                category_averages,
                final_value,
                final_text: format_grade(final_value),
                final_tendency: format_final_grade(final_value),
            }
        })
        .collect();

    SubjectSheet {
        class_id: class.id.clone(),
        subject_id: subject.id.clone(),
        subject_name: subject.name.clone(),
        categories,
        exams,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Exam, Student};

    fn grade(exam: &str, student: &str, value: f64) -> Grade {
        Grade {
            exam_id: exam.into(),
            student_id: student.into(),
            value,
        }
    }

    fn exam(id: &str, category: &str, weight: f64) -> Exam {
        Exam {
            id: id.into(),
            name: id.to_uppercase(),
            category_id: category.into(),
            weight,
            date: None,
        }
    }

    fn category(id: &str, weight: f64) -> Category {
        Category {
            id: id.into(),
            name: id.to_uppercase(),
            weight,
        }
    }

    fn sample_subject() -> Subject {
        Subject {
            id: "math".into(),
            name: "Mathe".into(),
            categories: vec![category("written", 2.0), category("oral", 1.0)],
            exams: vec![
                exam("ka1", "written", 1.0),
                exam("ka2", "written", 2.0),
                exam("o1", "oral", 1.0),
            ],
            grades: vec![
                grade("ka1", "s1", 1.0),
                grade("ka2", "s1", 4.0),
                grade("o1", "s1", 2.0),
                grade("ka1", "s2", 3.0),
            ],
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn get_grade_finds_pair_or_none() {
        let s = sample_subject();
        assert_eq!(get_grade(&s.grades, "s1", "ka2"), Some(4.0));
        assert_eq!(get_grade(&s.grades, "s2", "ka2"), None);
        assert_eq!(get_grade(&[], "s1", "ka1"), None);
    }

    #[test]
    fn category_average_is_weighted_over_graded_exams_only() {
        let s = sample_subject();
        // (1*1 + 4*2) / 3
        let avg = category_average(&s, "s1", "written").expect("average");
        assert!(approx(avg, 3.0));
        // s2 has ka1 only: missing ka2 is not a zero.
        assert_eq!(category_average(&s, "s2", "written"), Some(3.0));
    }

    #[test]
    fn category_average_without_grades_is_none_not_zero() {
        let s = sample_subject();
        assert_eq!(category_average(&s, "s2", "oral"), None);
        assert_eq!(category_average(&s, "s1", "no-such-category"), None);
    }

    #[test]
    fn category_average_is_invariant_under_weight_scaling() {
        let s = sample_subject();
        let mut scaled = s.clone();
        for e in &mut scaled.exams {
            e.weight *= 7.5;
        }
        let a = category_average(&s, "s1", "written").expect("a");
        let b = category_average(&scaled, "s1", "written").expect("b");
        assert!(approx(a, b));
    }

    #[test]
    fn zero_weights_yield_none() {
        let mut s = sample_subject();
        for e in &mut s.exams {
            e.weight = 0.0;
        }
        assert_eq!(category_average(&s, "s1", "written"), None);
        assert_eq!(final_grade(&s, "s1"), None);
    }

    #[test]
    fn final_grade_skips_categories_without_average() {
        let s = sample_subject();
        // written 3.0 * 2 + oral 2.0 * 1 over 3
        let f = final_grade(&s, "s1").expect("final");
        assert!(approx(f, 8.0 / 3.0));
        // s2: oral has no grade, so only written contributes.
        assert_eq!(final_grade(&s, "s2"), Some(3.0));
        assert_eq!(final_grade(&s, "s3"), None);
    }

    #[test]
    fn final_grade_with_single_exam_equals_that_grade() {
        let s = Subject {
            id: "x".into(),
            name: "X".into(),
            categories: vec![category("c", 1.0)],
            exams: vec![exam("e", "c", 1.0)],
            grades: vec![grade("e", "s", 2.7)],
        };
        assert_eq!(final_grade(&s, "s"), Some(2.7));
    }

    #[test]
    fn final_grade_without_categories_is_none() {
        let mut s = sample_subject();
        s.categories.clear();
        assert_eq!(final_grade(&s, "s1"), None);
    }

    #[test]
    fn format_grade_uses_two_decimals() {
        assert_eq!(format_grade(None), "-");
        assert_eq!(format_grade(Some(2.0)), "2.00");
        assert_eq!(format_grade(Some(8.0 / 3.0)), "2.67");
        assert_eq!(format_grade(Some(2.125)), "2.13");
    }

    #[test]
    fn format_final_grade_tendency_buckets() {
        assert_eq!(format_final_grade(None), "-");
        assert_eq!(format_final_grade(Some(1.0)), "1");
        assert_eq!(format_final_grade(Some(1.2)), "1-");
        assert_eq!(format_final_grade(Some(1.5)), "1-2");
        assert_eq!(format_final_grade(Some(1.8)), "2+");
        assert_eq!(format_final_grade(Some(1.9)), "2");
        assert_eq!(format_final_grade(Some(6.0)), "6");
    }

    #[test]
    fn format_final_grade_boundaries_fall_into_upper_bucket() {
        assert_eq!(format_final_grade(Some(2.125)), "2-");
        assert_eq!(format_final_grade(Some(2.375)), "2-3");
        assert_eq!(format_final_grade(Some(2.625)), "3+");
        assert_eq!(format_final_grade(Some(2.875)), "3");
        assert_eq!(format_final_grade(Some(2.124)), "2");
    }

    #[test]
    fn is_valid_grade_accepts_range_and_clear_markers() {
        assert!(is_valid_grade("6"));
        assert!(is_valid_grade("1"));
        assert!(is_valid_grade("2,5"));
        assert!(is_valid_grade("2.5"));
        assert!(is_valid_grade(""));
        assert!(is_valid_grade("-"));
        assert!(!is_valid_grade("6,5"));
        assert!(!is_valid_grade("0.9"));
        assert!(!is_valid_grade("abc"));
        assert!(!is_valid_grade("NaN"));
    }

    #[test]
    fn parse_grade_rounds_to_two_decimals() {
        assert_eq!(parse_grade("2,5"), Some(2.5));
        assert_eq!(parse_grade("7"), None);
        assert_eq!(parse_grade(""), None);
        assert_eq!(parse_grade("-"), None);
        assert_eq!(parse_grade("abc"), None);
        assert_eq!(parse_grade("3.456"), Some(3.46));
    }

    #[test]
    fn grade_text_uses_the_leading_number() {
        assert!(is_valid_grade("2abc"));
        assert_eq!(parse_grade("2abc"), Some(2.0));
        assert_eq!(parse_grade("3,0 Note"), Some(3.0));
        assert_eq!(parse_grade("1.5."), Some(1.5));
        assert_eq!(parse_grade("2,5,3"), Some(2.5));
        assert_eq!(parse_grade(".5e1"), Some(5.0));
        assert_eq!(parse_grade("4e"), Some(4.0));
        assert_eq!(parse_grade("abc2"), None);
        assert!(!is_valid_grade("abc2"));
        assert!(!is_valid_grade("."));
        assert!(!is_valid_grade("+"));
        assert!(!is_valid_grade("7 Punkte"));
    }

    #[test]
    fn parse_format_parse_is_stable() {
        let first = parse_grade("3.456");
        let again = parse_grade(&format_grade(first)).expect("reparse");
        assert!(approx(again, 3.46));
    }

    #[test]
    fn weight_percent_normalizes_against_siblings() {
        assert_eq!(weight_percent(2.0, 3.0), 67);
        assert_eq!(weight_percent(1.0, 3.0), 33);
        assert_eq!(weight_percent(1.0, 0.0), 0);
    }

    #[test]
    fn subject_sheet_rows_follow_student_order() {
        let class = SchoolClass {
            id: "c".into(),
            name: "5a".into(),
            students: vec![
                Student {
                    id: "s2".into(),
                    first_name: "Anna".into(),
                    last_name: "Schmidt".into(),
                },
                Student {
                    id: "s1".into(),
                    first_name: "Max".into(),
                    last_name: "Müller".into(),
                },
            ],
            subjects: vec![sample_subject()],
        };
        let sheet = compute_subject_sheet(&class, &class.subjects[0]);
        assert_eq!(sheet.categories.len(), 2);
        assert_eq!(sheet.categories[0].percent, 67);
        assert_eq!(sheet.exams.len(), 3);
        assert_eq!(sheet.exams[1].percent, 67);
        assert_eq!(sheet.rows[0].display_name, "Schmidt, Anna");
        assert_eq!(sheet.rows[0].grades, vec![Some(3.0), None, None]);
        assert_eq!(sheet.rows[0].category_averages[1].text, "-");
        assert_eq!(sheet.rows[1].final_text, "2.67");
        assert_eq!(sheet.rows[1].final_tendency, "3+");
    }
}
