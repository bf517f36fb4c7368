mod support;

use serde_json::json;
use support::{sample_snapshot, Sidecar};

fn slot<'a>(day: &'a serde_json::Value, period: u64) -> &'a serde_json::Value {
    day["slots"]
        .as_array()
        .expect("slots")
        .iter()
        .find(|s| s["period_id"].as_u64() == Some(period))
        .expect("slot present")
}

#[test]
fn views_require_a_loaded_timetable() {
    let mut sc = Sidecar::spawn();
    for (i, method) in ["timetable.day", "timetable.subjects", "timetable.overview"]
        .iter()
        .enumerate()
    {
        let error = sc.request_err(&i.to_string(), method, json!({}));
        assert_eq!(error["code"], json!("no_timetable"), "{method}");
    }
    let error = sc.request_err("9", "timetable.load", json!({ "snapshot": { "days": [] } }));
    assert_eq!(error["code"], json!("bad_params"));
    sc.shutdown();
}

#[test]
fn load_reports_skipped_slots() {
    let mut sc = Sidecar::spawn();
    sc.pin_clock("1", "2026-10-12T07:00:00");
    let loaded = sc.request_ok("2", "timetable.load", json!({ "snapshot": sample_snapshot() }));
    assert_eq!(loaded["loaded"], json!(7));
    assert_eq!(loaded["source"], json!("snapshot"));
    let skipped = loaded["skipped"].as_array().expect("skipped");
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["index"], json!(7));
    assert_eq!(loaded["serverToday"], json!("monday"));
    assert_eq!(loaded["localToday"], json!("monday"));
    assert_eq!(loaded["serverTodayAgrees"], json!(true));
    assert_eq!(loaded["fingerprint"].as_str().map(str::len), Some(64));
    sc.shutdown();
}

#[test]
fn today_view_flags_current_upcoming_and_active() {
    let mut sc = Sidecar::spawn();
    sc.pin_clock("1", "2026-10-12T10:15:30");
    sc.request_ok("2", "timetable.load", json!({ "snapshot": sample_snapshot() }));

    let day = sc.request_ok("3", "timetable.day", json!({}));
    assert_eq!(day["day"], json!("monday"));
    assert_eq!(day["isToday"], json!(true));
    let periods: Vec<u64> = day["slots"]
        .as_array()
        .expect("slots")
        .iter()
        .filter_map(|s| s["period_id"].as_u64())
        .collect();
    assert_eq!(periods, vec![1, 2, 3, 4, 5]);

    // The source claimed science was current; the local clock says otherwise.
    assert_eq!(slot(&day, 2)["is_current"], json!(false));
    assert_eq!(slot(&day, 3)["is_current"], json!(true));
    assert_eq!(slot(&day, 3)["is_active"], json!(true));
    assert_eq!(slot(&day, 3)["duration_minutes"], json!(40));
    assert_eq!(slot(&day, 4)["is_upcoming"], json!(true));
    assert_eq!(slot(&day, 4)["startable"], json!(false));
    assert_eq!(slot(&day, 1)["startable"], json!(false));
    assert_eq!(slot(&day, 5)["trackable"], json!(false));

    sc.shutdown();
}

#[test]
fn other_days_use_bell_times_and_no_live_flags() {
    let mut sc = Sidecar::spawn();
    sc.pin_clock("1", "2026-10-12T13:10:00");
    sc.request_ok("2", "timetable.load", json!({ "snapshot": sample_snapshot() }));

    let day = sc.request_ok("3", "timetable.day", json!({ "day": "wed" }));
    assert_eq!(day["day"], json!("wednesday"));
    assert_eq!(day["isToday"], json!(false));
    let science = slot(&day, 6);
    assert_eq!(science["start_time"], json!("13:00"));
    assert_eq!(science["end_time"], json!("13:40"));
    assert_eq!(science["trackable"], json!(true));
    assert_eq!(science["is_current"], json!(false));

    let error = sc.request_err("4", "timetable.day", json!({ "day": "someday" }));
    assert_eq!(error["code"], json!("bad_params"));
    sc.shutdown();
}

#[test]
fn sunday_opens_on_monday() {
    let mut sc = Sidecar::spawn();
    let clock = sc.request_ok("1", "clock.set", json!({ "now": "2026-10-11T10:15:30" }));
    assert_eq!(clock["displayDay"], json!("monday"));
    sc.request_ok("2", "timetable.load", json!({ "snapshot": sample_snapshot() }));

    let day = sc.request_ok("3", "timetable.day", json!({}));
    assert_eq!(day["day"], json!("monday"));
    assert_eq!(day["isToday"], json!(false));
    assert!(day["slots"]
        .as_array()
        .expect("slots")
        .iter()
        .all(|s| s["is_current"] == json!(false) && s["is_upcoming"] == json!(false)));
    sc.shutdown();
}

#[test]
fn subjects_and_overview_summarise_the_week() {
    let mut sc = Sidecar::spawn();
    sc.pin_clock("1", "2026-10-12T07:00:00");
    sc.request_ok("2", "timetable.load", json!({ "snapshot": sample_snapshot() }));

    let subjects = sc.request_ok("3", "timetable.subjects", json!({}));
    assert_eq!(
        subjects["subjects"],
        json!({
            "Art": [],
            "Math": ["6A"],
            "Science": ["7B", "8C"],
        })
    );

    let overview = sc.request_ok("4", "timetable.overview", json!({}));
    assert_eq!(overview["totalSlots"], json!(7));
    let days = overview["days"].as_array().expect("days");
    assert_eq!(days.len(), 6);
    assert_eq!(
        days[0],
        json!({
            "day": "monday",
            "slotCount": 5,
            "teachingCount": 3,
            "homeroomCount": 1,
            "freeCount": 1,
        })
    );
    assert_eq!(days[5]["slotCount"], json!(0));
    assert_eq!(overview["subjects"], subjects["subjects"]);
    sc.shutdown();
}
