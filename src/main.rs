mod clock;
mod db;
mod events;
mod ipc;
mod schedule;
mod ticker;
mod tracker;

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Sender};
use std::thread;

use events::Event;
use ticker::ThreadTicks;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn spawn_stdin_reader(tx: Sender<Event>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(Event::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Event::InputClosed);
        })
}

fn write_line(stdout: &mut impl Write, value: &serde_json::Value) {
    let _ = writeln!(
        stdout,
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{\"ok\":false}".to_string())
    );
}

fn flush_outbox(state: &ipc::AppState, stdout: &mut impl Write) {
    for event in state.outbox.drain() {
        write_line(stdout, &event);
    }
}

fn main() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (tx, rx) = mpsc::channel::<Event>();
    if let Err(e) = spawn_stdin_reader(tx.clone()) {
        error!("failed to start stdin reader: {e}");
        return;
    }
    let mut state = ipc::AppState::new(ThreadTicks::new(tx, Event::Tick));
    let mut stdout = io::stdout();
    info!(version = env!("CARGO_PKG_VERSION"), "timetabled ready");

    for event in rx.iter() {
        match event {
            Event::Line(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let req: ipc::Request = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(e) => {
                        // Can't reply without id.
                        warn!("bad request line: {e}");
                        write_line(
                            &mut stdout,
                            &serde_json::json!({
                                "ok": false,
                                "error": { "code": "bad_json", "message": e.to_string() }
                            }),
                        );
                        let _ = stdout.flush();
                        continue;
                    }
                };
                debug!(id = %req.id, method = %req.method, "request");
                let resp = ipc::handle_request(&mut state, req);
                flush_outbox(&state, &mut stdout);
                write_line(&mut stdout, &resp);
            }
            Event::Tick(session_id) => {
                ipc::handle_tick(&mut state, session_id);
                flush_outbox(&state, &mut stdout);
            }
            Event::InputClosed => break,
        }
        let _ = stdout.flush();
    }

    state.tracker.dispose();
    info!("input closed, shutting down");
}
