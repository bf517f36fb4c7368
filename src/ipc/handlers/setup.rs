use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::info;

const TRACKER_SECTION: &str = "tracker";
const TRACKER_KEY: &str = "setup.tracker";

/// Runtime knobs for the live tracker, stored per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub auto_start: bool,
    pub tick_interval_ms: u64,
    pub emit_ticks: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            tick_interval_ms: 1000,
            emit_ticks: false,
        }
    }
}

fn default_section() -> Value {
    let d = TrackerSettings::default();
    json!({
        "autoStart": d.auto_start,
        "tickIntervalMs": d.tick_interval_ms,
        "emitTicks": d.emit_ticks
    })
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_section_patch(current: &mut Value, patch: &Map<String, Value>) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())?;
    for (k, v) in patch {
        match k.as_str() {
            "autoStart" | "emitTicks" => {
                obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
            }
            "tickIntervalMs" => {
                obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 100, 60_000)?));
            }
            _ => return Err(format!("unknown tracker field: {}", k)),
        }
    }
    Ok(())
}

fn load_section(conn: &Connection) -> anyhow::Result<Value> {
    let mut current = default_section();
    if let Some(saved) = db::settings_get_json(conn, TRACKER_KEY)? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            let _ = merge_section_patch(&mut current, saved_obj);
        }
    }
    Ok(current)
}

pub fn load_tracker_settings(conn: &Connection) -> TrackerSettings {
    let defaults = TrackerSettings::default();
    let obj = load_section(conn)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    TrackerSettings {
        auto_start: obj
            .get("autoStart")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.auto_start),
        tick_interval_ms: obj
            .get("tickIntervalMs")
            .and_then(|v| v.as_u64())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.tick_interval_ms),
        emit_ticks: obj
            .get("emitTicks")
            .and_then(|v| v.as_bool())
            .unwrap_or(defaults.emit_ticks),
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match load_section(conn) {
        Ok(tracker) => ok(&req.id, json!({ "tracker": tracker })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    if section != TRACKER_SECTION {
        return err(&req.id, "bad_params", "unknown section", None);
    }
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(&mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, TRACKER_KEY, &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    let settings = load_tracker_settings(conn);
    info!(?settings, "tracker settings updated");
    state.apply_settings(settings);
    ok(&req.id, json!({ "ok": true, "tracker": current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
