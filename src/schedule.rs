use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unknown school day: {0}")]
    UnknownDay(String),
    #[error("slot {index} is invalid: {message}")]
    InvalidSlot { index: usize, message: String },
    #[error("snapshot must be an object with a slots array")]
    BadSnapshot,
}

/// School days. There are no Sunday slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub const ALL: [Day; 6] = [
        Day::Monday,
        Day::Tuesday,
        Day::Wednesday,
        Day::Thursday,
        Day::Friday,
        Day::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Day::Monday => "monday",
            Day::Tuesday => "tuesday",
            Day::Wednesday => "wednesday",
            Day::Thursday => "thursday",
            Day::Friday => "friday",
            Day::Saturday => "saturday",
        }
    }

    /// The school day for a calendar weekday; `None` on Sunday.
    pub fn from_weekday(weekday: Weekday) -> Option<Day> {
        match weekday {
            Weekday::Mon => Some(Day::Monday),
            Weekday::Tue => Some(Day::Tuesday),
            Weekday::Wed => Some(Day::Wednesday),
            Weekday::Thu => Some(Day::Thursday),
            Weekday::Fri => Some(Day::Friday),
            Weekday::Sat => Some(Day::Saturday),
            Weekday::Sun => None,
        }
    }

    /// The day shown by default in the timetable view.
    ///
    /// Sunday (weekday index 0) opens the week on Monday: the school runs a
    /// six-day week, so the next thing a teacher wants to see on a Sunday is
    /// Monday's timetable. This only affects display and default selection;
    /// auto-starting a lecture always uses [`Day::from_weekday`].
    pub fn display_day(weekday: Weekday) -> Day {
        Day::from_weekday(weekday).unwrap_or(Day::Monday)
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Day {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monday" | "mon" => Ok(Day::Monday),
            "tuesday" | "tue" => Ok(Day::Tuesday),
            "wednesday" | "wed" => Ok(Day::Wednesday),
            "thursday" | "thu" => Ok(Day::Thursday),
            "friday" | "fri" => Ok(Day::Friday),
            "saturday" | "sat" => Ok(Day::Saturday),
            other => Err(ScheduleError::UnknownDay(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses `HH:MM` (or `HH:MM:SS`, which some schedule exports send).
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let t = raw.trim();
    NaiveTime::parse_from_str(t, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
        .ok()
}

// Schedule sources send ids, names and times as strings or bare numbers.
// Anything else reads as missing rather than failing the whole slot.
fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SlotWindow {
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }

    pub fn minutes(&self) -> u32 {
        (self.end - self.start).num_minutes().max(0) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub day: Day,
    pub period_id: u32,
    #[serde(default)]
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub day: Day,
    pub period_id: u32,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub class_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub class_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub subject: Option<String>,
    #[serde(default)]
    pub is_homeroom: bool,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "de_opt_text")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    // Advisory flags from the schedule source. Echoed back, never trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_upcoming: Option<bool>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Slot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            day: self.day,
            period_id: self.period_id,
            class_id: non_empty(&self.class_id).map(str::to_string),
        }
    }

    pub fn subject_label(&self) -> Option<&str> {
        non_empty(&self.subject)
    }

    pub fn class_label(&self) -> Option<&str> {
        non_empty(&self.class_name).or_else(|| non_empty(&self.class_id))
    }

    pub fn is_teaching(&self) -> bool {
        !self.is_homeroom && self.subject_label().is_some()
    }

    /// `None` when either time is missing, malformed, or not `start < end`.
    pub fn window(&self) -> Option<SlotWindow> {
        let start = parse_clock_time(self.start_time.as_deref()?)?;
        let end = parse_clock_time(self.end_time.as_deref()?)?;
        (start < end).then_some(SlotWindow { start, end })
    }

    pub fn is_trackable(&self) -> bool {
        self.window().is_some()
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
            .filter(|m| *m > 0)
            .or_else(|| self.window().map(|w| w.minutes()))
    }
}

/// One entry of the school's bell schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    #[serde(alias = "period")]
    pub period_id: u32,
    #[serde(alias = "start")]
    pub start_time: String,
    #[serde(alias = "end")]
    pub end_time: String,
}

/// The payload returned by the schedule source for "my timetable".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    #[serde(default)]
    pub slots: Vec<serde_json::Value>,
    #[serde(default)]
    pub time_slots: Vec<serde_json::Value>,
    #[serde(default)]
    pub today: Option<String>,
}

impl ScheduleSnapshot {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ScheduleError> {
        if !value.get("slots").map(|v| v.is_array()).unwrap_or(false) {
            return Err(ScheduleError::BadSnapshot);
        }
        serde_json::from_value(value.clone()).map_err(|_| ScheduleError::BadSnapshot)
    }

    /// The server's idea of today. Advisory only.
    pub fn server_day(&self) -> Option<Day> {
        self.today.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSlot {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayOverview {
    pub day: Day,
    pub slot_count: usize,
    pub teaching_count: usize,
    pub homeroom_count: usize,
    pub free_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyOverview {
    pub days: Vec<DayOverview>,
    pub total_slots: usize,
    pub subjects: BTreeMap<String, BTreeSet<String>>,
}

/// Read-only view over one teacher's weekly slots, ordered by period.
#[derive(Debug, Clone, Default)]
pub struct ScheduleIndex {
    days: BTreeMap<Day, Vec<Slot>>,
}

impl ScheduleIndex {
    pub fn new(slots: Vec<Slot>) -> Self {
        let mut days: BTreeMap<Day, Vec<Slot>> = BTreeMap::new();
        for slot in slots {
            days.entry(slot.day).or_default().push(slot);
        }
        for list in days.values_mut() {
            // Stable: equal period ids keep source order.
            list.sort_by_key(|s| s.period_id);
        }
        Self { days }
    }

    /// Builds an index from a raw snapshot, skipping slots that cannot be
    /// read. Missing slot times are filled from the bell schedule.
    pub fn from_snapshot(snapshot: &ScheduleSnapshot) -> (Self, Vec<SkippedSlot>) {
        let bells: BTreeMap<u32, TimeSlot> = snapshot
            .time_slots
            .iter()
            .filter_map(|v| serde_json::from_value::<TimeSlot>(v.clone()).ok())
            .map(|t| (t.period_id, t))
            .collect();

        let mut slots = Vec::with_capacity(snapshot.slots.len());
        let mut skipped = Vec::new();
        for (index, raw) in snapshot.slots.iter().enumerate() {
            match parse_slot(index, raw) {
                Ok(mut slot) => {
                    if let Some(bell) = bells.get(&slot.period_id) {
                        if non_empty(&slot.start_time).is_none() {
                            slot.start_time = Some(bell.start_time.clone());
                        }
                        if non_empty(&slot.end_time).is_none() {
                            slot.end_time = Some(bell.end_time.clone());
                        }
                    }
                    slots.push(slot);
                }
                Err(e) => {
                    warn!("skipping timetable slot: {e}");
                    skipped.push(SkippedSlot {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (Self::new(slots), skipped)
    }

    pub fn len(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn slots_for_day(&self, day: Day) -> &[Slot] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.days.values().flatten()
    }

    pub fn find(&self, key: &SlotKey) -> Option<&Slot> {
        self.slots_for_day(key.day)
            .iter()
            .find(|s| s.key() == *key)
    }

    /// The slot whose `[start, end)` window contains `time`.
    pub fn current_slot(&self, day: Day, time: NaiveTime) -> Option<&Slot> {
        self.slots_for_day(day)
            .iter()
            .find(|s| s.window().map(|w| w.contains(time)).unwrap_or(false))
    }

    /// The first slot starting after `time` on `day`.
    pub fn upcoming_slot(&self, day: Day, time: NaiveTime) -> Option<&Slot> {
        self.slots_for_day(day)
            .iter()
            .filter_map(|s| s.window().map(|w| (w.start, s)))
            .filter(|(start, _)| *start > time)
            .min_by_key(|(start, _)| *start)
            .map(|(_, s)| s)
    }

    pub fn all_subjects_with_classes(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for slot in self.iter() {
            if slot.is_homeroom {
                continue;
            }
            let Some(subject) = slot.subject_label() else {
                continue;
            };
            let classes = out.entry(subject.to_string()).or_default();
            if let Some(class) = slot.class_label() {
                classes.insert(class.to_string());
            }
        }
        out
    }

    pub fn weekly_overview(&self) -> WeeklyOverview {
        let days = Day::ALL
            .iter()
            .map(|&day| {
                let slots = self.slots_for_day(day);
                let teaching_count = slots.iter().filter(|s| s.is_teaching()).count();
                let homeroom_count = slots.iter().filter(|s| s.is_homeroom).count();
                DayOverview {
                    day,
                    slot_count: slots.len(),
                    teaching_count,
                    homeroom_count,
                    free_count: slots.len() - teaching_count - homeroom_count,
                }
            })
            .collect();
        WeeklyOverview {
            days,
            total_slots: self.len(),
            subjects: self.all_subjects_with_classes(),
        }
    }

    /// Hex SHA-256 over the fields that matter to the tracker. Equal for two
    /// fetches of an unchanged schedule.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for slot in self.iter() {
            let line = format!(
                "{}|{}|{}|{}|{}|{}|{}\n",
                slot.day,
                slot.period_id,
                non_empty(&slot.class_id).unwrap_or(""),
                slot.start_time.as_deref().unwrap_or(""),
                slot.end_time.as_deref().unwrap_or(""),
                slot.subject_label().unwrap_or(""),
                slot.is_homeroom
            );
            hasher.update(line.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

fn parse_slot(index: usize, raw: &serde_json::Value) -> Result<Slot, ScheduleError> {
    let slot: Slot = serde_json::from_value(raw.clone()).map_err(|e| ScheduleError::InvalidSlot {
        index,
        message: e.to_string(),
    })?;
    if slot.period_id == 0 {
        return Err(ScheduleError::InvalidSlot {
            index,
            message: "period_id must be positive".to_string(),
        });
    }
    Ok(slot)
}
