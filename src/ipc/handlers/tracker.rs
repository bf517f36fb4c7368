use crate::events;
use crate::ipc::error::{err, ok, rejected};
use crate::ipc::types::{AppState, Request};
use crate::schedule::{Day, Slot};
use crate::tracker::{StartOutcome, StartRejection, TickOutcome};
use serde_json::{json, Value};

fn param_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolves `{day, periodId, classId?}` to a slot of the loaded timetable.
/// Without `classId` the first slot of that period wins.
fn lookup_slot(state: &AppState, req: &Request) -> Result<Slot, Value> {
    let Some(schedule) = state.schedule.as_ref() else {
        return Err(err(
            &req.id,
            "no_timetable",
            "load a timetable first (timetable.load)",
            None,
        ));
    };
    let Some(day_raw) = req.params.get("day").and_then(|v| v.as_str()) else {
        return Err(err(&req.id, "bad_params", "missing params.day", None));
    };
    let day: Day = day_raw
        .parse()
        .map_err(|e: crate::schedule::ScheduleError| {
            err(&req.id, "bad_params", e.to_string(), None)
        })?;
    let period_id = req
        .params
        .get("periodId")
        .and_then(|v| match v {
            Value::String(s) => s.trim().parse::<u32>().ok(),
            other => other.as_u64().and_then(|n| u32::try_from(n).ok()),
        })
        .ok_or_else(|| err(&req.id, "bad_params", "missing/invalid params.periodId", None))?;
    let class_id = req.params.get("classId").and_then(param_id);

    schedule
        .index
        .slots_for_day(day)
        .iter()
        .find(|s| {
            s.period_id == period_id
                && class_id
                    .as_deref()
                    .map(|c| s.key().class_id.as_deref() == Some(c))
                    .unwrap_or(true)
        })
        .cloned()
        .ok_or_else(|| rejected(&req.id, &StartRejection::UnknownSlot))
}

fn handle_start(state: &mut AppState, req: &Request) -> Value {
    let slot = match lookup_slot(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let now = state.clock.now();
    let previous = state.tracker.session().map(|s| s.session_id);
    match state.tracker.start_teaching(&slot, now) {
        Ok(StartOutcome::Started {
            session_id,
            remaining_seconds,
            replaced,
        }) => {
            if let Some(key) = &replaced {
                events::emit_stopped(&state.outbox, previous, key, "replaced");
            }
            events::emit_started(&state.outbox, session_id, &slot, remaining_seconds, false);
            ok(
                &req.id,
                json!({
                    "started": true,
                    "sessionId": session_id,
                    "remainingSeconds": remaining_seconds,
                    "replaced": replaced,
                    "tracker": state.tracker.state(),
                }),
            )
        }
        Ok(StartOutcome::AlreadyActive { session_id }) => ok(
            &req.id,
            json!({
                "started": false,
                "sessionId": session_id,
                "tracker": state.tracker.state(),
            }),
        ),
        Err(rejection) => rejected(&req.id, &rejection),
    }
}

fn handle_cancel(state: &mut AppState, req: &Request) -> Value {
    let stopped = state.tracker.cancel();
    if let Some(session) = &stopped {
        events::emit_stopped(
            &state.outbox,
            Some(session.session_id),
            &session.slot.key(),
            "cancelled",
        );
    }
    ok(
        &req.id,
        json!({
            "cancelled": stopped.is_some(),
            "tracker": state.tracker.state(),
        }),
    )
}

fn handle_state(state: &mut AppState, req: &Request) -> Value {
    // A suspended host may have slept through the end of the period.
    let now = state.clock.now();
    state.tracker.evaluate(now);
    ok(&req.id, json!(state.tracker.state()))
}

fn handle_tick(state: &mut AppState, req: &Request) -> Value {
    let now = state.clock.now();
    let outcome = match state.tracker.evaluate(now) {
        TickOutcome::Running { remaining_seconds } => {
            json!({ "outcome": "running", "remainingSeconds": remaining_seconds })
        }
        TickOutcome::Ended(ended) => json!({ "outcome": "ended", "ended": ended }),
        TickOutcome::Stale | TickOutcome::Idle => json!({ "outcome": "idle" }),
    };
    ok(
        &req.id,
        json!({
            "tick": outcome,
            "tracker": state.tracker.state(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "tracker.start" => Some(handle_start(state, req)),
        "tracker.cancel" => Some(handle_cancel(state, req)),
        "tracker.state" => Some(handle_state(state, req)),
        "tracker.tick" => Some(handle_tick(state, req)),
        _ => None,
    }
}
