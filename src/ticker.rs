use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// A running repeating timer. Cancelling must stop delivery before it returns.
pub trait TickHandle {
    fn cancel(&mut self);
    fn is_active(&self) -> bool;
}

/// Starts repeating timers bound to one lecture session.
pub trait TickSource {
    type Handle: TickHandle;

    fn start(&mut self, session_id: Uuid) -> Self::Handle;
}

/// Timer threads that post a message into the daemon's event queue.
pub struct ThreadTicks<M> {
    tx: Sender<M>,
    make: fn(Uuid) -> M,
    interval: Duration,
}

impl<M: Send + 'static> ThreadTicks<M> {
    pub fn new(tx: Sender<M>, make: fn(Uuid) -> M) -> Self {
        Self {
            tx,
            make,
            interval: DEFAULT_TICK_INTERVAL,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Applies to timers started afterwards.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }
}

impl<M: Send + 'static> TickSource for ThreadTicks<M> {
    type Handle = ThreadTicker;

    fn start(&mut self, session_id: Uuid) -> ThreadTicker {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let tx = self.tx.clone();
        let make = self.make;
        let interval = self.interval;
        let spawned = thread::Builder::new()
            .name(format!("tick-{session_id}"))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tx.send(make(session_id)).is_err() {
                            break;
                        }
                    }
                    // Stop sender dropped or signalled.
                    _ => break,
                }
            });
        match spawned {
            Ok(thread) => ThreadTicker {
                stop: Some(stop_tx),
                thread: Some(thread),
            },
            Err(e) => {
                error!("failed to spawn tick thread: {e}");
                ThreadTicker {
                    stop: None,
                    thread: None,
                }
            }
        }
    }
}

/// Owned handle to a tick thread. Dropping it cancels the timer.
pub struct ThreadTicker {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TickHandle for ThreadTicker {
    fn cancel(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("tick thread panicked");
            } else {
                debug!("tick thread stopped");
            }
        }
    }

    fn is_active(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::TryRecvError;

    fn fast_ticks() -> (ThreadTicks<Uuid>, mpsc::Receiver<Uuid>) {
        let (tx, rx) = mpsc::channel();
        let mut ticks = ThreadTicks::new(tx, |id| id);
        ticks.set_interval(Duration::from_millis(5));
        (ticks, rx)
    }

    #[test]
    fn delivers_ticks_tagged_with_session() {
        let (mut ticks, rx) = fast_ticks();
        let session = Uuid::new_v4();
        let mut handle = ticks.start(session);
        assert!(handle.is_active());
        let got = rx.recv_timeout(Duration::from_secs(2)).expect("tick");
        assert_eq!(got, session);
        handle.cancel();
        assert!(!handle.is_active());
    }

    #[test]
    fn cancel_stops_delivery() {
        let (mut ticks, rx) = fast_ticks();
        let mut handle = ticks.start(Uuid::new_v4());
        rx.recv_timeout(Duration::from_secs(2)).expect("first tick");
        handle.cancel();
        // Anything sent before the join completed is already queued.
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        // Cancelling twice is harmless.
        handle.cancel();
    }

    #[test]
    fn dropping_handle_stops_delivery() {
        let (mut ticks, rx) = fast_ticks();
        {
            let _handle = ticks.start(Uuid::new_v4());
            rx.recv_timeout(Duration::from_secs(2)).expect("first tick");
        }
        while rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(30));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }
}
