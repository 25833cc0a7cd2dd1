use crate::calc::final_grade;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_class, find_subject, store_mut};
use crate::ipc::params::{optional_str, required_name, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_subjects_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({ "subjects": [] }));
    };
    let class = find_class(store, class_id)?;

    let subjects: Vec<serde_json::Value> = class
        .subjects
        .iter()
        .map(|subj| {
            let graded = class
                .students
                .iter()
                .filter(|s| final_grade(subj, &s.id).is_some())
                .count();
            json!({
                "id": subj.id,
                "name": subj.name,
                "categoryCount": subj.categories.len(),
                "examCount": subj.exams.len(),
                "gradedStudentCount": graded,
            })
        })
        .collect();
    Ok(json!({ "subjects": subjects }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let name = required_name(req, "name")?;
    find_class(store, class_id)?;

    let subject_id = store
        .add_subject(class_id, &name)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "subjectId": subject_id, "name": name }))
}

fn handle_subjects_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let name = required_name(req, "name")?;
    store
        .update_subject(class_id, subject_id, &name)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    store
        .delete_subject(class_id, subject_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

/// Subjects are selected within the selected class.
fn handle_subjects_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let subject_id = optional_str(req, "subjectId")?;
    if let Some(id) = subject_id {
        let Some(class_id) = store.selected_class().map(|c| c.id.clone()) else {
            return Err(HandlerErr::bad_params("no class selected"));
        };
        find_subject(store, &class_id, id)?;
    }
    store
        .select_subject(subject_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "selectedSubjectId": subject_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "subjects.list" => handle_subjects_list(state, req),
        "subjects.create" => handle_subjects_create(state, req),
        "subjects.update" => handle_subjects_update(state, req),
        "subjects.delete" => handle_subjects_delete(state, req),
        "subjects.select" => handle_subjects_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
