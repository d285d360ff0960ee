//! Completion fences
//!
//! A fence is a monotonically increasing counter signalled by the disk queue
//! once every command submitted before the signal has been processed. Waiters
//! block until the counter reaches a target value. When the queue hits an I/O
//! error it poisons every fence it would have signalled, so waiters fail
//! instead of hanging.

use crate::error::F1Error;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct FenceState {
    value: u64,
    failure: Option<String>,
}

/// Monotonic completion counter
#[derive(Debug, Default)]
pub struct Fence {
    state: Mutex<FenceState>,
    cond: Condvar,
}

impl Fence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.state.lock().value
    }

    /// Raise the value to `value` and wake waiters (never lowers it)
    pub fn signal(&self, value: u64) {
        let mut state = self.state.lock();
        state.value = state.value.max(value);
        self.cond.notify_all();
    }

    /// Poison the fence; current and future waits below the value fail
    pub fn fail(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(message.into());
        }
        self.cond.notify_all();
    }

    /// Block until the value is at least `value`
    ///
    /// With a timeout, gives up with [`F1Error::FenceTimeout`] once it
    /// elapses. A poisoned fence yields [`F1Error::IoFailed`] unless the
    /// target was already reached.
    pub fn wait(&self, value: u64, timeout: Option<Duration>) -> Result<(), F1Error> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        loop {
            if state.value >= value {
                return Ok(());
            }

            if let Some(message) = &state.failure {
                return Err(F1Error::IoFailed(message.clone()));
            }

            match (deadline, timeout) {
                (Some(deadline), Some(timeout)) => {
                    if Instant::now() >= deadline {
                        return Err(F1Error::FenceTimeout {
                            expected: value,
                            observed: state.value,
                            timeout,
                        });
                    }
                    self.cond.wait_until(&mut state, deadline);
                }
                _ => self.cond.wait(&mut state),
            }
        }
    }
}
