use crate::backup;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::params::required_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn workspace_param(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    req.params
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(HandlerErr::no_workspace)
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = required_str(req, "outPath")?.trim();
    if out_path.is_empty() {
        return Err(HandlerErr::bad_params("missing outPath"));
    }
    let workspace_path = workspace_param(state, req)?;

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    tracing::info!(path = out_path, sha256 = %export.db_sha256, "workspace bundle exported");

    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let in_path = required_str(req, "inPath")?.trim();
    if in_path.is_empty() {
        return Err(HandlerErr::bad_params("missing inPath"));
    }
    let workspace_path = workspace_param(state, req)?;
    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return Err(HandlerErr::not_found("bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // Nothing is closed until the backup has been verified.
    let verified = backup::read_backup(&src).map_err(|e| {
        tracing::warn!(path = in_path, error = %format!("{e:#}"), "backup rejected");
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    tracing::info!(path = in_path, format = verified.format(), "restoring backup");

    // Close the database before its file is replaced, and reopen whatever
    // is on disk afterwards, even when the install failed.
    state.store = None;
    let installed = verified.install(&workspace_path);
    let reopened = open_workspace(state, &workspace_path);

    let import = installed.map_err(|e| {
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;

    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "backup.exportWorkspaceBundle" => handle_export_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_import_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
