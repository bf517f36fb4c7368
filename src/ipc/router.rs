use super::handlers;
use super::types::{AppState, Request};
use crate::events;
use crate::ipc::error::err;
use crate::tracker::TickOutcome;
use uuid::Uuid;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::timetable::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::tracker::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// One tick from the timer thread of `session_id`.
pub fn handle_tick(state: &mut AppState, session_id: Uuid) {
    let now = state.clock.now();
    if let TickOutcome::Running { remaining_seconds } = state.tracker.tick(session_id, now) {
        if state.settings.emit_ticks {
            let progress = state.tracker.session().map(|s| s.progress()).unwrap_or(0.0);
            events::emit_tick(&state.outbox, session_id, remaining_seconds, progress);
        }
    }
}
