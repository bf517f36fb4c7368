use crate::schedule::{Slot, SlotKey};
use crate::tracker::PeriodEnded;
use serde::Serialize;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use uuid::Uuid;

const PERIOD_ENDED_EVENT: &str = "tracker.periodEnded";
const TICK_EVENT: &str = "tracker.tick";
const STARTED_EVENT: &str = "tracker.started";
const STOPPED_EVENT: &str = "tracker.stopped";

/// Messages consumed by the daemon's main loop, in arrival order.
#[derive(Debug)]
pub enum Event {
    Line(String),
    Tick(Uuid),
    InputClosed,
}

/// Notifications queued during one event and written before its response.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    queue: Rc<RefCell<Vec<serde_json::Value>>>,
}

impl Outbox {
    fn push<S: Serialize>(&self, event: &str, payload: S) {
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        self.queue
            .borrow_mut()
            .push(json!({ "event": event, "payload": payload }));
    }

    pub fn drain(&self) -> Vec<serde_json::Value> {
        self.queue.borrow_mut().drain(..).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct TickPayload {
    session_id: Uuid,
    remaining_seconds: u32,
    progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartedPayload<'a> {
    session_id: Uuid,
    slot: &'a Slot,
    remaining_seconds: u32,
    automatic: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StoppedPayload<'a> {
    session_id: Option<Uuid>,
    slot: &'a SlotKey,
    reason: &'a str,
}

pub fn emit_period_ended(outbox: &Outbox, ended: &PeriodEnded) {
    outbox.push(PERIOD_ENDED_EVENT, ended);
}

pub fn emit_tick(outbox: &Outbox, session_id: Uuid, remaining_seconds: u32, progress: f64) {
    outbox.push(
        TICK_EVENT,
        TickPayload {
            session_id,
            remaining_seconds,
            progress,
        },
    );
}

pub fn emit_started(
    outbox: &Outbox,
    session_id: Uuid,
    slot: &Slot,
    remaining_seconds: u32,
    automatic: bool,
) {
    outbox.push(
        STARTED_EVENT,
        StartedPayload {
            session_id,
            slot,
            remaining_seconds,
            automatic,
        },
    );
}

pub fn emit_stopped(outbox: &Outbox, session_id: Option<Uuid>, slot: &SlotKey, reason: &str) {
    outbox.push(
        STOPPED_EVENT,
        StoppedPayload {
            session_id,
            slot,
            reason,
        },
    );
}
