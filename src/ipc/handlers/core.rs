use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::params::required_str;
use crate::ipc::types::{AppState, Request};
use crate::store::GradebookStore;
use serde_json::json;
use std::path::{Path, PathBuf};

/// Opens (or creates) the workspace database and loads the gradebook from
/// it, replacing whatever workspace was open before.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let mut store = GradebookStore::open(Box::new(db::SqliteKv::new(conn)))?;
    store.subscribe(|event| {
        tracing::trace!(revision = event.revision, change = ?event.change, "gradebook changed");
    });
    tracing::info!(workspace = %path.to_string_lossy(), "workspace opened");
    state.workspace = Some(path.to_path_buf());
    state.store = Some(store);
    Ok(())
}

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(req, "path")?);
    open_workspace(state, &path)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

fn handle_state_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let Some(store) = state.store.as_ref() else {
        return Ok(json!({
            "selectedClassId": null,
            "selectedSubjectId": null,
            "revision": 0,
        }));
    };
    Ok(json!({
        "selectedClassId": store.selected_class().map(|c| c.id.clone()),
        "selectedSubjectId": store.selected_subject().map(|s| s.id.clone()),
        "revision": store.revision(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        "state.get" => handle_state_get(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
