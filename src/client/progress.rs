use crate::runtime::protocol::ProgressSnapshot;
use crate::transport::InterimResponseHandler;
use std::sync::{Arc, Mutex};

/// Caller-side receiver of incremental progress.
pub trait ProgressMonitor: Send + Sync {
    fn set_description(&self, _description: Option<&str>) {}

    fn set_total_steps(&self, _total_steps: Option<u64>) {}

    /// `delta` is always strictly positive.
    fn worked(&self, _delta: u64) {}

    fn done(&self) {}
}

/// Turns the absolute snapshots sent by the callee into incremental monitor calls, skipping
/// anything that did not change.
pub struct ProgressDeltaAdapter<M: ?Sized> {
    monitor: Arc<M>,
    last: Mutex<ProgressSnapshot>,
}

impl<M: ProgressMonitor + ?Sized> ProgressDeltaAdapter<M> {
    pub fn new(monitor: Arc<M>) -> Self {
        Self {
            monitor,
            last: Mutex::new(ProgressSnapshot::default()),
        }
    }

    pub fn apply(&self, snapshot: &ProgressSnapshot) {
        let mut last = self.last.lock().expect("progress adapter mutex poisoned");

        if snapshot.description != last.description {
            self.monitor.set_description(snapshot.description.as_deref());
        }

        if snapshot.total_steps != last.total_steps {
            self.monitor.set_total_steps(snapshot.total_steps);
        }

        if let Some(total_worked) = snapshot.total_worked {
            let previous = last.total_worked.unwrap_or(0);
            if total_worked > previous {
                self.monitor.worked(total_worked - previous);
            }
        }

        if snapshot.finished && !last.finished {
            self.monitor.done();
        }

        *last = snapshot.clone();
    }
}

impl<M: ProgressMonitor + ?Sized> InterimResponseHandler for ProgressDeltaAdapter<M> {
    fn interim_response(&self, snapshot: &ProgressSnapshot) {
        self.apply(snapshot);
    }
}

/// Progress handler for calls that did not ask for progress.
pub(crate) struct DiscardProgress;

impl InterimResponseHandler for DiscardProgress {
    fn interim_response(&self, _snapshot: &ProgressSnapshot) {}
}
