use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::{find_class, store_mut};
use crate::ipc::params::{optional_str, required_name, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_classes_list(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({ "classes": [] }));
    };

    // Counts let the UI show a useful dashboard.
    let classes: Vec<serde_json::Value> = store
        .snapshot()
        .classes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "studentCount": c.students.len(),
                "subjectCount": c.subjects.len(),
            })
        })
        .collect();
    Ok(json!({ "classes": classes }))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class = find_class(store, required_str(req, "classId")?)?;
    Ok(json!({ "class": class }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let name = required_name(req, "name")?;
    let class_id = store.add_class(&name).map_err(HandlerErr::write_failed)?;
    Ok(json!({ "classId": class_id, "name": name }))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    let name = required_name(req, "name")?;
    store
        .update_class(class_id, &name)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = required_str(req, "classId")?;
    store
        .delete_class(class_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "ok": true }))
}

fn handle_classes_select(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let store = store_mut(state)?;
    let class_id = optional_str(req, "classId")?;
    if let Some(id) = class_id {
        find_class(store, id)?;
    }
    store
        .select_class(class_id)
        .map_err(HandlerErr::write_failed)?;
    Ok(json!({ "selectedClassId": class_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "classes.list" => handle_classes_list(state, req),
        "classes.get" => handle_classes_get(state, req),
        "classes.create" => handle_classes_create(state, req),
        "classes.update" => handle_classes_update(state, req),
        "classes.delete" => handle_classes_delete(state, req),
        "classes.select" => handle_classes_select(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
