use chrono::{Local, NaiveDateTime};

/// Local wall-clock time as seen by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    /// Pinned by the host (simulation, demos, deterministic tests).
    Pinned(NaiveDateTime),
}

impl Clock {
    pub fn now(&self) -> NaiveDateTime {
        match self {
            Clock::System => Local::now().naive_local(),
            Clock::Pinned(at) => *at,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Clock::System => "system",
            Clock::Pinned(_) => "pinned",
        }
    }

    pub fn parse_pinned(raw: &str) -> Option<NaiveDateTime> {
        let t = raw.trim();
        NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S"))
            .or_else(|_| NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::Clock;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn pinned_clock_does_not_move() {
        let at = NaiveDate::from_ymd_opt(2026, 10, 12)
            .and_then(|d| d.and_hms_opt(10, 15, 30))
            .expect("datetime");
        let clock = Clock::Pinned(at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.now(), at);
        assert_eq!(clock.mode(), "pinned");
    }

    #[test]
    fn parses_pinned_formats() {
        let a = Clock::parse_pinned("2026-10-12T10:15:30").expect("iso");
        let b = Clock::parse_pinned("2026-10-12 10:15:30").expect("space");
        assert_eq!(a, b);
        assert_eq!(Clock::parse_pinned("2026-10-12T10:15").map(|d| d.second()), Some(0));
        assert!(Clock::parse_pinned("monday 10am").is_none());
    }
}
