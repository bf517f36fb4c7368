use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::clock::Clock;
use crate::events::{self, Event, Outbox};
use crate::ipc::handlers::setup::TrackerSettings;
use crate::schedule::{Day, ScheduleIndex};
use crate::ticker::ThreadTicks;
use crate::tracker::LiveTracker;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub type Tracker = LiveTracker<ThreadTicks<Event>>;

pub struct LoadedSchedule {
    pub index: ScheduleIndex,
    pub fingerprint: String,
    pub server_day: Option<Day>,
}

/// Everything one teacher view owns. Created in `main`, dropped on exit.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub clock: Clock,
    pub settings: TrackerSettings,
    pub schedule: Option<LoadedSchedule>,
    pub tracker: Tracker,
    pub outbox: Outbox,
}

impl AppState {
    pub fn new(ticks: ThreadTicks<Event>) -> Self {
        let outbox = Outbox::default();
        let mut tracker = LiveTracker::new(ticks);
        let sink = outbox.clone();
        tracker.on_period_ended(move |ended| events::emit_period_ended(&sink, ended));
        Self {
            workspace: None,
            db: None,
            clock: Clock::System,
            settings: TrackerSettings::default(),
            schedule: None,
            tracker,
            outbox,
        }
    }

    pub fn apply_settings(&mut self, settings: TrackerSettings) {
        let ticks = self.tracker.ticks_mut();
        ticks.set_interval(std::time::Duration::from_millis(settings.tick_interval_ms));
        tracing::debug!(interval = ?ticks.interval(), "tick interval applied");
        self.settings = settings;
    }
}
