use crate::schedule::{Day, ScheduleIndex, Slot, SlotKey, SlotWindow};
use crate::ticker::{TickHandle, TickSource};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Why a slot cannot be started as a lecture. Never a state change.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartRejection {
    #[error("homeroom periods cannot be started as lectures")]
    Homeroom,
    #[error("free periods have no subject to teach")]
    NoSubject,
    #[error("slot has missing or malformed start/end times")]
    NotTrackable,
    #[error("slot is scheduled for {slot_day}, today is {today}")]
    NotToday { slot_day: Day, today: String },
    #[error("period already ended at {end}")]
    PeriodOver { end: String },
    #[error("slot is not in the loaded timetable")]
    UnknownSlot,
}

impl StartRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            StartRejection::Homeroom => "homeroom",
            StartRejection::NoSubject => "free_period",
            StartRejection::NotTrackable => "not_trackable",
            StartRejection::NotToday { .. } => "not_today",
            StartRejection::PeriodOver { .. } => "period_over",
            StartRejection::UnknownSlot => "unknown_slot",
        }
    }
}

/// Checks that a slot is a start-able lecture and returns its window.
pub fn lecture_window(slot: &Slot) -> Result<SlotWindow, StartRejection> {
    if slot.is_homeroom {
        return Err(StartRejection::Homeroom);
    }
    if slot.subject_label().is_none() {
        return Err(StartRejection::NoSubject);
    }
    slot.window().ok_or(StartRejection::NotTrackable)
}

/// `(endMinutes - nowMinutes) * 60 - nowSeconds`, with `nowMinutes` counted
/// from midnight of `date` so a later day always comes out negative.
pub fn remaining_seconds(date: NaiveDate, end: NaiveTime, now: NaiveDateTime) -> i64 {
    let day_offset = (now.date() - date).num_days();
    let now_minutes = day_offset * 24 * 60 + (now.hour() * 60 + now.minute()) as i64;
    let end_minutes = (end.hour() * 60 + end.minute()) as i64;
    (end_minutes - now_minutes) * 60 + end.second() as i64 - now.second() as i64
}

/// Elapsed share of the period in percent, always within `[0, 100]`.
pub fn progress_percent(remaining_seconds: u32, duration_minutes: u32) -> f64 {
    if duration_minutes == 0 {
        return 100.0;
    }
    let total = duration_minutes as f64 * 60.0;
    (100.0 - (remaining_seconds as f64 / total) * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerStatus {
    Idle,
    Listening,
}

#[derive(Debug, Clone)]
pub struct LectureSession {
    pub session_id: Uuid,
    pub slot: Slot,
    pub date: NaiveDate,
    pub window: SlotWindow,
    pub remaining_seconds: u32,
}

impl LectureSession {
    fn remaining_at(&self, now: NaiveDateTime) -> i64 {
        remaining_seconds(self.date, self.window.end, now)
    }

    pub fn progress(&self) -> f64 {
        let minutes = self
            .slot
            .duration_minutes()
            .unwrap_or_else(|| self.window.minutes());
        progress_percent(self.remaining_seconds, minutes)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub status: TrackerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_slot: Option<Slot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEnded {
    pub session_id: Uuid,
    pub slot: Slot,
    pub ended_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started {
        session_id: Uuid,
        remaining_seconds: u32,
        replaced: Option<SlotKey>,
    },
    AlreadyActive {
        session_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    Running { remaining_seconds: u32 },
    Ended(PeriodEnded),
    /// The tick belongs to a session that no longer exists.
    Stale,
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    Idle,
    Kept { remaining_seconds: u32 },
    /// The refreshed slot ends before `now`.
    Ended(PeriodEnded),
    Stopped(SlotKey),
}

struct Active<H> {
    session: LectureSession,
    ticker: H,
}

type PeriodEndedListener = Box<dyn FnMut(&PeriodEnded)>;

/// Live period tracker: `Idle` or `Listening` with exactly one running timer.
pub struct LiveTracker<S: TickSource> {
    ticks: S,
    active: Option<Active<S::Handle>>,
    listeners: Vec<PeriodEndedListener>,
}

impl<S: TickSource> LiveTracker<S> {
    pub fn new(ticks: S) -> Self {
        Self {
            ticks,
            active: None,
            listeners: Vec::new(),
        }
    }

    pub fn ticks_mut(&mut self) -> &mut S {
        &mut self.ticks
    }

    pub fn on_period_ended(&mut self, listener: impl FnMut(&PeriodEnded) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn status(&self) -> TrackerStatus {
        if self.active.is_some() {
            TrackerStatus::Listening
        } else {
            TrackerStatus::Idle
        }
    }

    pub fn session(&self) -> Option<&LectureSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    pub fn state(&self) -> TrackerState {
        match self.session() {
            Some(session) => TrackerState {
                status: TrackerStatus::Listening,
                session_id: Some(session.session_id),
                active_slot: Some(session.slot.clone()),
                remaining_seconds: Some(session.remaining_seconds),
                progress: Some(session.progress()),
            },
            None => TrackerState {
                status: TrackerStatus::Idle,
                session_id: None,
                active_slot: None,
                remaining_seconds: None,
                progress: None,
            },
        }
    }

    pub fn start_teaching(
        &mut self,
        slot: &Slot,
        now: NaiveDateTime,
    ) -> Result<StartOutcome, StartRejection> {
        let window = lecture_window(slot)?;
        let today = Day::from_weekday(now.weekday());
        if today != Some(slot.day) {
            return Err(StartRejection::NotToday {
                slot_day: slot.day,
                today: today
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "sunday".to_string()),
            });
        }
        let remaining = remaining_seconds(now.date(), window.end, now);
        if remaining <= 0 {
            return Err(StartRejection::PeriodOver {
                end: window.end.format("%H:%M").to_string(),
            });
        }

        let key = slot.key();
        if let Some(active) = &self.active {
            if active.session.slot.key() == key {
                return Ok(StartOutcome::AlreadyActive {
                    session_id: active.session.session_id,
                });
            }
        }

        // The previous timer is gone before the next one starts.
        let replaced = self.stop_active().map(|s| s.slot.key());

        let session_id = Uuid::new_v4();
        let remaining_seconds = remaining.min(u32::MAX as i64) as u32;
        let ticker = self.ticks.start(session_id);
        info!(
            %session_id,
            day = %slot.day,
            period = slot.period_id,
            subject = slot.subject_label().unwrap_or(""),
            remaining_seconds,
            "lecture started"
        );
        self.active = Some(Active {
            session: LectureSession {
                session_id,
                slot: slot.clone(),
                date: now.date(),
                window,
                remaining_seconds,
            },
            ticker,
        });
        Ok(StartOutcome::Started {
            session_id,
            remaining_seconds,
            replaced,
        })
    }

    /// Stops the running lecture. No-op when idle; never emits period-ended.
    pub fn cancel(&mut self) -> Option<LectureSession> {
        let stopped = self.stop_active()?;
        info!(session_id = %stopped.session_id, "lecture cancelled");
        Some(stopped)
    }

    /// Tears the tracker down; the timer is cancelled before this returns.
    pub fn dispose(&mut self) {
        if let Some(stopped) = self.stop_active() {
            debug!(session_id = %stopped.session_id, "tracker disposed while listening");
        }
        self.listeners.clear();
    }

    /// Handles one tick from the timer of `session_id`.
    pub fn tick(&mut self, session_id: Uuid, now: NaiveDateTime) -> TickOutcome {
        let Some(active) = self.active.as_mut() else {
            debug!(%session_id, "tick after session ended");
            return TickOutcome::Stale;
        };
        if active.session.session_id != session_id {
            debug!(%session_id, "tick for a replaced session");
            return TickOutcome::Stale;
        }
        let remaining = active.session.remaining_at(now);
        if remaining > 0 {
            let remaining_seconds = remaining.min(u32::MAX as i64) as u32;
            active.session.remaining_seconds = remaining_seconds;
            return TickOutcome::Running { remaining_seconds };
        }
        self.expire(now)
    }

    /// Re-evaluates the running lecture immediately, e.g. after a host wake-up.
    pub fn evaluate(&mut self, now: NaiveDateTime) -> TickOutcome {
        match self.session().map(|s| s.session_id) {
            Some(session_id) => self.tick(session_id, now),
            None => TickOutcome::Idle,
        }
    }

    /// Starts the lecture whose window contains `now`, if the tracker is idle.
    pub fn seed(&mut self, index: &ScheduleIndex, now: NaiveDateTime) -> Option<Uuid> {
        if self.active.is_some() {
            return None;
        }
        let day = Day::from_weekday(now.weekday())?;
        let time = now.time();
        let slot = index.slots_for_day(day).iter().find(|s| {
            lecture_window(s)
                .map(|w| w.contains(time))
                .unwrap_or(false)
        })?;
        match self.start_teaching(slot, now) {
            Ok(StartOutcome::Started { session_id, .. }) => Some(session_id),
            Ok(StartOutcome::AlreadyActive { .. }) => None,
            Err(rejection) => {
                warn!(period = slot.period_id, "auto-start rejected: {rejection}");
                None
            }
        }
    }

    /// Aligns the running lecture with a rebuilt schedule. A kept session is
    /// re-evaluated against `now` with its refreshed end time.
    pub fn reconcile(&mut self, index: &ScheduleIndex, now: NaiveDateTime) -> Reconciled {
        let Some(active) = self.active.as_mut() else {
            return Reconciled::Idle;
        };
        let key = active.session.slot.key();
        let refreshed = index
            .find(&key)
            .and_then(|slot| lecture_window(slot).ok().map(|w| (slot, w)));
        match refreshed {
            Some((slot, window)) => {
                active.session.slot = slot.clone();
                active.session.window = window;
                let session_id = active.session.session_id;
                match self.tick(session_id, now) {
                    TickOutcome::Running { remaining_seconds } => {
                        Reconciled::Kept { remaining_seconds }
                    }
                    TickOutcome::Ended(ended) => Reconciled::Ended(ended),
                    // Unreachable with an active session of this id.
                    TickOutcome::Stale | TickOutcome::Idle => Reconciled::Idle,
                }
            }
            None => {
                self.stop_active();
                info!(day = %key.day, period = key.period_id, "lecture stopped: slot left the timetable");
                Reconciled::Stopped(key)
            }
        }
    }

    fn stop_active(&mut self) -> Option<LectureSession> {
        let mut active = self.active.take()?;
        active.ticker.cancel();
        Some(active.session)
    }

    fn expire(&mut self, now: NaiveDateTime) -> TickOutcome {
        let Some(mut session) = self.stop_active() else {
            return TickOutcome::Idle;
        };
        session.remaining_seconds = 0;
        let ended = PeriodEnded {
            session_id: session.session_id,
            slot: session.slot,
            ended_at: now.format(TIMESTAMP_FORMAT).to_string(),
        };
        info!(session_id = %ended.session_id, period = ended.slot.period_id, "period ended");
        for listener in self.listeners.iter_mut() {
            listener(&ended);
        }
        TickOutcome::Ended(ended)
    }
}
