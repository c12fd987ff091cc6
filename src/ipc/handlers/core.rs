use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::db;
use crate::engine;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            info!(path = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match engine::validation_mode(conn) {
        Ok(mode) => ok(&req.id, json!({ "validationMode": mode.as_str() })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_config_set_validation_mode(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let raw = match req.params.get("mode").and_then(|v| v.as_str()) {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing mode", None),
    };
    let Some(mode) = engine::ValidationMode::parse(raw) else {
        return err(
            &req.id,
            "bad_params",
            "mode must be one of: strict, permissive",
            Some(json!({ "mode": raw })),
        );
    };
    match engine::set_validation_mode(conn, mode) {
        Ok(()) => {
            info!(mode = mode.as_str(), "validation mode changed");
            ok(&req.id, json!({ "validationMode": mode.as_str() }))
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.get" => Some(handle_config_get(state, req)),
        "config.setValidationMode" => Some(handle_config_set_validation_mode(state, req)),
        _ => None,
    }
}
