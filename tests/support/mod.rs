#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running `timetabled` plus every event line it has written so far.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    pub events: Vec<serde_json::Value>,
    /// Error lines that could not be tied to a request id.
    pub stray: Vec<serde_json::Value>,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_timetabled");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn timetabled");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            events: Vec::new(),
            stray: Vec::new(),
        }
    }

    pub fn send_raw(&mut self, line: &str) {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
    }

    fn read_value(&mut self) -> serde_json::Value {
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read line");
        assert!(!line.trim().is_empty(), "sidecar closed stdout");
        serde_json::from_str(line.trim()).expect("parse line json")
    }

    /// Reads lines until the response for `id`; events seen on the way are kept.
    pub fn request(&mut self, id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        self.send_raw(&payload.to_string());
        loop {
            let value = self.read_value();
            if value.get("event").is_some() {
                self.events.push(value);
                continue;
            }
            if value.get("id").is_none() {
                self.stray.push(value);
                continue;
            }
            assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
            return value;
        }
    }

    pub fn request_ok(&mut self, id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(id, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_default()
    }

    /// Returns the error object of a failed request.
    pub fn request_err(&mut self, id: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(id, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value.get("error").cloned().unwrap_or_default()
    }

    /// Blocks until an event named `name` arrives, without sending anything.
    pub fn wait_event(&mut self, name: &str) -> serde_json::Value {
        loop {
            let value = self.read_value();
            if value.get("event").is_none() {
                panic!("unexpected response while waiting for {}: {}", name, value);
            }
            self.events.push(value.clone());
            if value.get("event").and_then(|v| v.as_str()) == Some(name) {
                return value;
            }
        }
    }

    pub fn events_named(&self, name: &str) -> Vec<&serde_json::Value> {
        self.events
            .iter()
            .filter(|e| e.get("event").and_then(|v| v.as_str()) == Some(name))
            .collect()
    }

    pub fn pin_clock(&mut self, id: &str, at: &str) {
        self.request_ok(id, "clock.set", json!({ "now": at }));
    }

    pub fn shutdown(mut self) {
        drop(self.stdin);
        let status = self.child.wait().expect("wait sidecar");
        assert!(status.success(), "sidecar exited with {status}");
    }
}

/// One teacher's week. 2026-10-12 is a Monday.
pub fn sample_snapshot() -> serde_json::Value {
    json!({
        "today": "monday",
        "slots": [
            { "day": "monday", "period_id": 1, "is_homeroom": true, "subject": "Homeroom", "class_name": "6A", "start_time": "08:00", "end_time": "08:20" },
            { "day": "monday", "period_id": 2, "subject": "Science", "class_id": "7B", "class_name": "7B", "start_time": "09:20", "end_time": "10:00", "is_current": true },
            { "day": "monday", "period_id": 3, "subject": "Math", "class_id": "6A", "class_name": "6A", "start_time": "10:00", "end_time": "10:40" },
            { "day": "monday", "period_id": 4, "class_name": "6A", "start_time": "10:40", "end_time": "11:20" },
            { "day": "monday", "period_id": 5, "subject": "Art", "start_time": "late", "end_time": "12:00" },
            { "day": "tuesday", "period_id": 1, "subject": "Math", "class_id": 6, "class_name": "6A", "start_time": "10:00", "end_time": "10:40" },
            { "day": "wednesday", "period_id": 6, "subject": "Science", "class_id": "8C", "class_name": "8C" },
            { "day": "sunday", "period_id": 1, "subject": "Chess", "start_time": "10:00", "end_time": "10:40" }
        ],
        "time_slots": [
            { "period": 6, "start": "13:00", "end": "13:40" }
        ]
    })
}
