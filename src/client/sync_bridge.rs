//! Blocking adapter over the three-outcome completion contract.
//!
//! The outcome is stored under the same mutex the waiter checks, so an outcome recorded
//! before [`ResultWaiter::await_result`] starts is never missed.

use super::interim::CompletionCallback;
use crate::runtime::error::InvocationError;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Debug)]
enum Outcome {
    Finished(Value),
    Failed(InvocationError),
    TimedOut,
}

/// Completion callback that records the first outcome and wakes the single waiter.
#[derive(Debug, Default)]
pub struct SyncBridge {
    outcome: Mutex<Option<Outcome>>,
    ready: Condvar,
}

/// The waiting half of a [`SyncBridge`]. Consumed by the wait, so each bridge is awaited once.
#[derive(Debug)]
pub struct ResultWaiter {
    bridge: Arc<SyncBridge>,
}

impl SyncBridge {
    pub fn channel() -> (Arc<SyncBridge>, ResultWaiter) {
        let bridge = Arc::new(SyncBridge::default());
        let waiter = ResultWaiter {
            bridge: bridge.clone(),
        };
        (bridge, waiter)
    }

    fn record(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock().expect("sync bridge mutex poisoned");
        if slot.is_some() {
            tracing::debug!(?outcome, "sync bridge already holds an outcome; ignoring");
            return;
        }
        *slot = Some(outcome);
        self.ready.notify_one();
    }
}

impl CompletionCallback for SyncBridge {
    fn finished(&self, value: Value) {
        self.record(Outcome::Finished(value));
    }

    fn failed(&self, error: InvocationError) {
        self.record(Outcome::Failed(error));
    }

    fn timed_out(&self) {
        tracing::warn!("blocking invocation timed out");
        self.record(Outcome::TimedOut);
    }
}

impl ResultWaiter {
    /// Blocks the calling thread until the outcome arrives.
    pub fn await_result(self) -> Result<Value, InvocationError> {
        let guard = self
            .bridge
            .outcome
            .lock()
            .expect("sync bridge mutex poisoned");
        let mut guard = self
            .bridge
            .ready
            .wait_while(guard, |outcome| outcome.is_none())
            .expect("sync bridge mutex poisoned");

        match guard.take() {
            Some(Outcome::Finished(value)) => Ok(value),
            Some(Outcome::Failed(error)) => Err(InvocationError::Remote(Box::new(error))),
            Some(Outcome::TimedOut) | None => Err(InvocationError::Timeout),
        }
    }
}
