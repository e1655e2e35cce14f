//! Bounded invocation of user notification callbacks.

use crate::logger::Logger;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Time a user callback may take before the client stops waiting for it.
pub const NOTIFY_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Pending { round: u64, deadline: Instant },
    Released { round: u64 },
}

/// A gate held while a connect notification runs.
///
/// Each notification closes the gate for a new round and releases it exactly
/// once when it finishes. Dispatch calls [`wait`](NotifyGate::wait) before
/// invoking handlers, so no message reaches a handler before the connect
/// callback has returned or its grace period has elapsed. Waiting on an open
/// gate returns immediately.
#[derive(Debug)]
pub(crate) struct NotifyGate {
    state: Mutex<GateState>,
    released: Condvar,
}

impl NotifyGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
            released: Condvar::new(),
        }
    }

    /// Closes the gate for at most `grace` and returns the round to release.
    /// A round still pending is superseded.
    pub(crate) fn begin(&self, grace: Duration) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let round = match *state {
            GateState::Idle => 1,
            GateState::Pending { round, .. } | GateState::Released { round } => round + 1,
        };
        let deadline = Instant::now()
            .checked_add(grace)
            .unwrap_or_else(Instant::now);
        *state = GateState::Pending { round, deadline };
        round
    }

    /// Opens the gate if `round` is still the current one. Returns false when
    /// the round was already released or superseded.
    pub(crate) fn release(&self, round: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            GateState::Pending { round: current, .. } if current == round => {
                *state = GateState::Released { round };
                self.released.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Blocks while the gate is pending and its deadline has not passed.
    pub(crate) fn wait(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while let GateState::Pending { deadline, .. } = *state {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            state = self
                .released
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

/// Runs `callback` on its own thread and watches it from another one for at
/// most `grace`. `on_finish` runs on the watcher once the callback returned,
/// panicked or timed out. Nothing is surfaced to the caller; failures are
/// logged.
pub(crate) fn spawn_notification<F, G>(
    name: &'static str,
    grace: Duration,
    logger: Arc<dyn Logger>,
    callback: F,
    on_finish: G,
) where
    F: FnOnce() + Send + 'static,
    G: FnOnce() + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let spawned = thread::Builder::new()
        .name(format!("ditto-{}", name))
        .spawn(move || {
            callback();
            let _ = done_tx.send(());
        });
    if let Err(err) = spawned {
        logger.error(&format!("failed to start {} notification: {}", name, err));
        on_finish();
        return;
    }

    let watcher_logger = Arc::clone(&logger);
    let watched = thread::Builder::new()
        .name(format!("ditto-{}-watch", name))
        .spawn(move || {
            match done_rx.recv_timeout(grace) {
                Ok(()) => {}
                Err(mpsc::RecvTimeoutError::Timeout) => watcher_logger.warn(&format!(
                    "{} notification did not complete within {:?}",
                    name, grace
                )),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    watcher_logger.error(&format!("{} notification panicked", name))
                }
            }
            on_finish();
        });
    if let Err(err) = watched {
        logger.error(&format!("failed to watch {} notification: {}", name, err));
    }
}
