use crate::calc::{compute_subject_sheet, format_grade, get_grade, is_valid_grade, parse_grade};
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_subject, store_mut};
use crate::ipc::params::{grade_value, required_str};
use crate::ipc::types::{AppState, Request};
use crate::model::{SchoolClass, Subject};
use crate::text_import::parse_grade_column;
use serde_json::json;

fn check_pair(
    class: &SchoolClass,
    subject: &Subject,
    student_id: &str,
    exam_id: &str,
) -> Result<(), HandlerErr> {
    if !class.students.iter().any(|s| s.id == student_id) {
        return Err(HandlerErr::not_found("student not found")
            .with_details(json!({ "studentId": student_id })));
    }
    check_exam(subject, exam_id)
}

fn check_exam(subject: &Subject, exam_id: &str) -> Result<(), HandlerErr> {
    if !subject.exams.iter().any(|e| e.id == exam_id) {
        return Err(
            HandlerErr::not_found("exam not found").with_details(json!({ "examId": exam_id }))
        );
    }
    Ok(())
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let student_id = required_str(req, "studentId")?;
    let exam_id = required_str(req, "examId")?;
    let (_, subject) = find_subject(store, class_id, subject_id)?;

    let value = get_grade(&subject.grades, student_id, exam_id);
    Ok(json!({ "value": value, "text": format_grade(value) }))
}

fn handle_grades_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let student_id = required_str(req, "studentId")?;
    let exam_id = required_str(req, "examId")?;
    let value = grade_value(req)?;

    let (class, subject) = find_subject(store, class_id, subject_id)?;
    check_pair(class, subject, student_id, exam_id)?;

    store
        .set_grade(class_id, subject_id, student_id, exam_id, value)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "value": value, "text": format_grade(value) }))
}

/// Checks grade text as typed into a cell, without storing it.
fn handle_grades_validate(
    _state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let text = required_str(req, "text")?.trim();
    let valid = is_valid_grade(text);
    let value = if valid { parse_grade(text) } else { None };
    Ok(json!({ "valid": valid, "value": value }))
}

fn handle_grades_import_column(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let exam_id = required_str(req, "examId")?;
    let text = required_str(req, "text")?;

    let (class, subject) = find_subject(store, class_id, subject_id)?;
    check_exam(subject, exam_id)?;
    let entries = parse_grade_column(text, &class.students).inspect_err(|e| {
        tracing::warn!(error = %e, exam_id, "grade column rejected");
    })?;

    let imported = entries.iter().filter(|g| g.value.is_some()).count();
    store
        .import_exam_grades(class_id, subject_id, exam_id, entries)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "imported": imported }))
}

fn handle_grades_sheet(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let (class, subject) = find_subject(store, class_id, subject_id)?;

    let sheet = compute_subject_sheet(class, subject);
    serde_json::to_value(sheet).map_err(|e| HandlerErr::new("server_error", e.to_string()))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.get" => handle_grades_get(state, req),
        "grades.set" => handle_grades_set(state, req),
        "grades.validate" => handle_grades_validate(state, req),
        "grades.importColumn" => handle_grades_import_column(state, req),
        "grades.sheet" => handle_grades_sheet(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
