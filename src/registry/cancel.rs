use super::leak::LeakDetector;
use crate::runtime::protocol::InvocationId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Receives a notification when the invocation it was registered for is cancelled.
pub trait CancelListener: Send + Sync {
    fn cancelled(&self, id: &InvocationId);
}

impl<F> CancelListener for F
where
    F: Fn(&InvocationId) + Send + Sync,
{
    fn cancelled(&self, id: &InvocationId) {
        self(id)
    }
}

type ListenerMap = HashMap<InvocationId, Vec<Arc<dyn CancelListener>>>;

/// Tracks outstanding invocations and the listeners interested in their cancellation.
///
/// Every operation takes the map lock, so calls for the same id are serialized. Listeners are
/// always notified after the lock is released, which lets them call back into the coordinator.
pub struct CancellationCoordinator {
    listeners: Mutex<ListenerMap>,
    leaks: LeakDetector,
}

impl CancellationCoordinator {
    pub fn new(leaks: LeakDetector) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            leaks,
        }
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Self::new(LeakDetector::new("invocations", threshold))
    }

    /// Starts tracking `id` with an empty listener set. Re-registering an active id keeps its
    /// listeners.
    pub fn register_invocation(&self, id: InvocationId) {
        let mut listeners = self.lock();
        if listeners.contains_key(&id) {
            tracing::warn!(
                invocation = %id,
                "invocation registered twice; keeping existing listeners"
            );
            return;
        }
        listeners.insert(id, Vec::new());
        self.leaks.observe(listeners.len());
    }

    /// Adds `listener` to the set for `id`. An id that is not tracked counts as already
    /// cancelled, so the listener is notified immediately on the calling thread.
    pub fn register_cancel_listener(&self, id: &InvocationId, listener: Arc<dyn CancelListener>) {
        {
            let mut listeners = self.lock();
            if let Some(set) = listeners.get_mut(id) {
                set.push(listener);
                return;
            }
        }

        tracing::debug!(invocation = %id, "cancel listener registered for untracked invocation");
        listener.cancelled(id);
    }

    /// Notifies and drops every listener of `id`. Returns `false` when `id` was not tracked.
    pub fn cancel(&self, id: &InvocationId) -> bool {
        let removed = {
            let mut listeners = self.lock();
            let removed = listeners.remove(id);
            self.leaks.observe(listeners.len());
            removed
        };

        match removed {
            Some(set) => {
                tracing::debug!(invocation = %id, listeners = set.len(), "cancelling invocation");
                for listener in set {
                    listener.cancelled(id);
                }
                true
            }
            None => {
                tracing::trace!(invocation = %id, "cancel for untracked invocation ignored");
                false
            }
        }
    }

    /// Stops tracking `id` without notifying anyone. Returns `false` when `id` was not tracked.
    pub fn unregister_invocation(&self, id: &InvocationId) -> bool {
        let mut listeners = self.lock();
        let removed = listeners.remove(id).is_some();
        self.leaks.observe(listeners.len());
        removed
    }

    pub fn is_tracked(&self, id: &InvocationId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn leak_warnings(&self) -> u64 {
        self.leaks.warnings()
    }

    fn lock(&self) -> MutexGuard<'_, ListenerMap> {
        self.listeners
            .lock()
            .expect("cancellation coordinator mutex poisoned")
    }
}

impl fmt::Debug for CancellationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationCoordinator")
            .field("tracked", &self.len())
            .field("leaks", &self.leaks)
            .finish()
    }
}
