use crate::db;
use crate::events;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, LoadedSchedule, Request};
use crate::schedule::{Day, ScheduleIndex, ScheduleSnapshot, TimeSlot};
use crate::tracker::{lecture_window, Reconciled};
use chrono::{Datelike, NaiveDateTime};
use serde_json::{json, Value};
use tracing::{info, warn};

fn loaded<'a>(state: &'a AppState, req: &Request) -> Result<&'a LoadedSchedule, Value> {
    state.schedule.as_ref().ok_or_else(|| {
        err(
            &req.id,
            "no_timetable",
            "load a timetable first (timetable.load)",
            None,
        )
    })
}

fn snapshot_param(req: &Request) -> Result<Option<ScheduleSnapshot>, Value> {
    match req.params.get("snapshot") {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => ScheduleSnapshot::from_value(raw)
            .map(Some)
            .map_err(|e| err(&req.id, "bad_params", e.to_string(), None)),
    }
}

fn workspace_snapshot(state: &AppState, req: &Request) -> Result<ScheduleSnapshot, Value> {
    let Some(conn) = state.db.as_ref() else {
        return Err(err(&req.id, "no_workspace", "select a workspace first", None));
    };
    let (slots, bells) = db::timetable_load(conn)
        .map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))?;
    let to_values = |items: Result<Vec<Value>, serde_json::Error>| {
        items.map_err(|e| err(&req.id, "db_query_failed", e.to_string(), None))
    };
    Ok(ScheduleSnapshot {
        slots: to_values(slots.iter().map(serde_json::to_value).collect())?,
        time_slots: to_values(bells.iter().map(serde_json::to_value).collect())?,
        today: None,
    })
}

/// Swaps in a rebuilt index and brings the tracker in line with it.
fn install(
    state: &mut AppState,
    index: ScheduleIndex,
    server_day: Option<Day>,
    now: NaiveDateTime,
) -> Value {
    let fingerprint = index.fingerprint();
    let unchanged = state
        .schedule
        .as_ref()
        .map(|s| s.fingerprint == fingerprint)
        .unwrap_or(false);

    let previous = state.tracker.session().map(|s| s.session_id);
    let reconciled = state.tracker.reconcile(&index, now);
    if let Reconciled::Stopped(key) = &reconciled {
        events::emit_stopped(&state.outbox, previous, key, "removed_from_timetable");
    }

    let local_day = Day::from_weekday(now.weekday());
    if let Some(server) = server_day {
        if Some(server) != local_day {
            // The device clock decides; the server's day is only reported.
            warn!(server = %server, local = ?local_day, "schedule source disagrees about today");
        }
    }

    let mut auto_started = None;
    if state.settings.auto_start {
        if let Some(session_id) = state.tracker.seed(&index, now) {
            if let Some(session) = state.tracker.session() {
                events::emit_started(
                    &state.outbox,
                    session_id,
                    &session.slot,
                    session.remaining_seconds,
                    true,
                );
            }
            auto_started = Some(session_id);
        }
    }

    if index.is_empty() {
        warn!("loaded timetable has no slots");
    }
    info!(slots = index.len(), %fingerprint, unchanged, "timetable loaded");
    let loaded = index.len();
    state.schedule = Some(LoadedSchedule {
        index,
        fingerprint: fingerprint.clone(),
        server_day,
    });

    json!({
        "loaded": loaded,
        "fingerprint": fingerprint,
        "unchanged": unchanged,
        "serverToday": server_day,
        "localToday": local_day,
        "serverTodayAgrees": server_day.map(|d| Some(d) == local_day),
        "reconciled": match reconciled {
            Reconciled::Idle => "idle",
            Reconciled::Kept { .. } => "kept",
            Reconciled::Ended(_) => "ended",
            Reconciled::Stopped(_) => "stopped",
        },
        "autoStarted": auto_started,
        "tracker": state.tracker.state(),
    })
}

fn handle_load(state: &mut AppState, req: &Request) -> Value {
    let now = state.clock.now();
    let (snapshot, source) = match snapshot_param(req) {
        Ok(Some(s)) => (s, "snapshot"),
        Ok(None) => match workspace_snapshot(state, req) {
            Ok(s) => (s, "workspace"),
            Err(resp) => return resp,
        },
        Err(resp) => return resp,
    };
    let (index, skipped) = ScheduleIndex::from_snapshot(&snapshot);
    let mut result = install(state, index, snapshot.server_day(), now);
    result["source"] = json!(source);
    result["skipped"] = json!(skipped);
    ok(&req.id, result)
}

fn handle_save(state: &mut AppState, req: &Request) -> Value {
    let snapshot = match snapshot_param(req) {
        Ok(Some(s)) => s,
        Ok(None) => return err(&req.id, "bad_params", "missing params.snapshot", None),
        Err(resp) => return resp,
    };
    let Some(conn) = state.db.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (index, skipped) = ScheduleIndex::from_snapshot(&snapshot);
    let bells: Vec<TimeSlot> = snapshot
        .time_slots
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    match db::timetable_replace(conn, index.iter(), &bells) {
        Ok(saved) => ok(
            &req.id,
            json!({
                "success": true,
                "saved": saved,
                "skipped": skipped,
                "fingerprint": index.fingerprint(),
            }),
        ),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_day(state: &mut AppState, req: &Request) -> Value {
    let schedule = match loaded(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let now = state.clock.now();
    let day = match req.params.get("day").and_then(|v| v.as_str()) {
        Some(raw) => match raw.parse::<Day>() {
            Ok(d) => d,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        },
        None => Day::display_day(now.weekday()),
    };
    let is_today = Day::from_weekday(now.weekday()) == Some(day);
    let time = now.time();
    let current = is_today
        .then(|| schedule.index.current_slot(day, time).map(|s| s.key()))
        .flatten();
    let upcoming = is_today
        .then(|| schedule.index.upcoming_slot(day, time).map(|s| s.key()))
        .flatten();
    let active = state.tracker.session().map(|s| s.slot.key());

    let slots: Vec<Value> = schedule
        .index
        .slots_for_day(day)
        .iter()
        .map(|slot| {
            let key = slot.key();
            let mut v = serde_json::to_value(slot).unwrap_or(Value::Null);
            if let Some(obj) = v.as_object_mut() {
                // Local time comparison replaces whatever the source sent.
                obj.insert("is_current".into(), json!(current.as_ref() == Some(&key)));
                obj.insert("is_upcoming".into(), json!(upcoming.as_ref() == Some(&key)));
                obj.insert("is_active".into(), json!(active.as_ref() == Some(&key)));
                obj.insert("trackable".into(), json!(slot.is_trackable()));
                obj.insert("startable".into(), json!(lecture_window(slot).is_ok()));
                obj.insert("duration_minutes".into(), json!(slot.duration_minutes()));
            }
            v
        })
        .collect();

    ok(
        &req.id,
        json!({
            "day": day,
            "isToday": is_today,
            "slots": slots,
        }),
    )
}

fn handle_subjects(state: &mut AppState, req: &Request) -> Value {
    match loaded(state, req) {
        Ok(schedule) => ok(
            &req.id,
            json!({ "subjects": schedule.index.all_subjects_with_classes() }),
        ),
        Err(resp) => resp,
    }
}

fn handle_overview(state: &mut AppState, req: &Request) -> Value {
    match loaded(state, req) {
        Ok(schedule) => ok(&req.id, json!(schedule.index.weekly_overview())),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "timetable.load" => Some(handle_load(state, req)),
        "timetable.save" => Some(handle_save(state, req)),
        "timetable.day" => Some(handle_day(state, req)),
        "timetable.subjects" => Some(handle_subjects(state, req)),
        "timetable.overview" => Some(handle_overview(state, req)),
        _ => None,
    }
}
