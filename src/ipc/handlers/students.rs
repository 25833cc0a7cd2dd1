use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_class, store_mut};
use crate::ipc::params::{optional_str, required_name, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::NewStudent;
use crate::text_import::{parse_student_column, parse_student_list, ImportError};
use serde_json::json;

/// First names may be left empty; last names may not.
fn first_name_param(req: &Request) -> Result<String, HandlerErr> {
    Ok(optional_str(req, "firstName")?
        .map(|s| s.trim().to_string())
        .unwrap_or_default())
}

fn handle_students_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({ "students": [] }));
    };
    let class = find_class(store, class_id)?;
    let students: Vec<serde_json::Value> = class
        .students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "firstName": s.first_name,
                "lastName": s.last_name,
                "displayName": s.display_name(),
            })
        })
        .collect();
    Ok(json!({ "students": students }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let first_name = first_name_param(req)?;
    let last_name = required_name(req, "lastName")?;
    find_class(store, class_id)?;

    let student_id = store
        .add_student(class_id, &first_name, &last_name)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "studentId": student_id }))
}

fn handle_students_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    let first_name = first_name_param(req)?;
    let last_name = required_name(req, "lastName")?;
    store
        .update_student(class_id, student_id, &first_name, &last_name)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let student_id = required_str(req, "studentId")?;
    store
        .delete_student(class_id, student_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn parse_name_pairs(req: &Request) -> Result<Vec<NewStudent>, HandlerErr> {
    let Some(items) = req.params.get("students").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("students must be an array"));
    };
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let first = item
            .get("firstName")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or("");
        let Some(last) = item.get("lastName").and_then(|v| v.as_str()).map(str::trim) else {
            return Err(HandlerErr::bad_params("each student needs a lastName")
                .with_details(json!({ "index": i })));
        };
        if last.is_empty() {
            return Err(HandlerErr::bad_params("lastName must not be empty")
                .with_details(json!({ "index": i })));
        }
        out.push(NewStudent {
            first_name: first.to_string(),
            last_name: last.to_string(),
        });
    }
    Ok(out)
}

fn handle_students_replace(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let students = parse_name_pairs(req)?;
    find_class(store, class_id)?;

    let ids = store
        .replace_students(class_id, students)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "studentIds": ids }))
}

/// Free-form list appended to the class.
fn handle_students_import_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let text = required_str(req, "text")?;
    find_class(store, class_id)?;

    let students = parse_student_list(text);
    if students.is_empty() {
        return Err(ImportError::NoData.into());
    }
    let ids = store
        .add_students(class_id, students)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "studentIds": ids }))
}

/// Strict "Lastname, Firstname" column replacing all students.
fn handle_students_import_column(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let text = required_str(req, "text")?;
    find_class(store, class_id)?;

    let students = parse_student_column(text).inspect_err(|e| {
        tracing::warn!(error = %e, "student column rejected");
    })?;
    let ids = store
        .replace_students(class_id, students)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "studentIds": ids }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_students_list(state, req),
        "students.create" => handle_students_create(state, req),
        "students.update" => handle_students_update(state, req),
        "students.delete" => handle_students_delete(state, req),
        "students.replace" => handle_students_replace(state, req),
        "students.importList" => handle_students_import_list(state, req),
        "students.importColumn" => handle_students_import_column(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
