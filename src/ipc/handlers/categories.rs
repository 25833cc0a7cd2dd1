use crate::calc::weight_percent;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_subject, store_mut};
use crate::ipc::params::{required_name, required_str, weight};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_categories_list(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({ "categories": [] }));
    };
    let (_, subject) = find_subject(store, class_id, subject_id)?;

    let total: f64 = subject.categories.iter().map(|c| c.weight).sum();
    let categories: Vec<serde_json::Value> = subject
        .categories
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "weight": c.weight,
                "percent": weight_percent(c.weight, total),
                "examCount": subject.exams_in(&c.id).count(),
            })
        })
        .collect();
    Ok(json!({ "categories": categories }))
}

fn handle_categories_create(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let name = required_name(req, "name")?;
    let weight = weight(req)?;
    find_subject(store, class_id, subject_id)?;

    let category_id = store
        .add_category(class_id, subject_id, &name, weight)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "categoryId": category_id }))
}

fn handle_categories_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let category_id = required_str(req, "categoryId")?;
    let name = required_name(req, "name")?;
    let weight = weight(req)?;
    store
        .update_category(class_id, subject_id, category_id, &name, weight)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

/// Also removes the category's exams and their grades.
fn handle_categories_delete(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let subject_id = required_str(req, "subjectId")?;
    let category_id = required_str(req, "categoryId")?;
    store
        .delete_category(class_id, subject_id, category_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "categories.list" => handle_categories_list(state, req),
        "categories.create" => handle_categories_create(state, req),
        "categories.update" => handle_categories_update(state, req),
        "categories.delete" => handle_categories_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
