use crate::clock::Clock;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup::load_tracker_settings;
use crate::ipc::types::{AppState, Request};
use crate::schedule::Day;
use chrono::Datelike;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn clock_json(clock: &Clock) -> serde_json::Value {
    let now = clock.now();
    json!({
        "mode": clock.mode(),
        "now": now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "displayDay": Day::display_day(now.weekday()),
    })
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "clock": clock_json(&state.clock),
            "timetableLoaded": state.schedule.is_some(),
            "serverToday": state.schedule.as_ref().and_then(|s| s.server_day),
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
            let settings = load_tracker_settings(&conn);
            info!(workspace = %path.display(), ?settings, "workspace selected");
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.apply_settings(settings);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_clock_set(state: &mut AppState, req: &Request) -> serde_json::Value {
    match req.params.get("now") {
        None | Some(serde_json::Value::Null) => {
            state.clock = Clock::System;
        }
        Some(v) => {
            let Some(at) = v.as_str().and_then(Clock::parse_pinned) else {
                return err(
                    &req.id,
                    "bad_params",
                    "now must be YYYY-MM-DDTHH:MM:SS or null",
                    None,
                );
            };
            state.clock = Clock::Pinned(at);
        }
    }
    info!(mode = state.clock.mode(), "clock changed");
    ok(&req.id, clock_json(&state.clock))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "clock.set" => Some(handle_clock_set(state, req)),
        _ => None,
    }
}
