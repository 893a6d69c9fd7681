use super::leak::LeakDetector;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Pairs one interim request with its single answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "corr-{}", self.0)
    }
}

/// Consumer of the answer to one question. Invoked at most once.
pub type ResponseSink = Box<dyn FnOnce(Value) + Send>;

/// Pending questions awaiting exactly one answer.
pub struct CorrelationRegistry {
    pending: Mutex<HashMap<CorrelationId, ResponseSink>>,
    next_id: AtomicU64,
    leaks: LeakDetector,
}

impl CorrelationRegistry {
    pub fn new(leaks: LeakDetector) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            leaks,
        }
    }

    pub fn with_threshold(threshold: usize) -> Self {
        Self::new(LeakDetector::new("correlations", threshold))
    }

    /// Stores `sink` under a fresh id.
    pub fn register(&self, sink: ResponseSink) -> CorrelationId {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut pending = self.lock();
        pending.insert(id, sink);
        self.leaks.observe(pending.len());
        id
    }

    /// Hands `response` to the sink registered under `id` and forgets it. Returns `false` when
    /// the question was already answered or abandoned.
    pub fn deliver(&self, id: CorrelationId, response: Value) -> bool {
        let sink = {
            let mut pending = self.lock();
            let sink = pending.remove(&id);
            self.leaks.observe(pending.len());
            sink
        };

        match sink {
            Some(sink) => {
                sink(response);
                true
            }
            None => {
                tracing::trace!(correlation = %id, "response for unknown correlation ignored");
                false
            }
        }
    }

    /// Forgets the sink registered under `id` without invoking it.
    pub fn unregister(&self, id: CorrelationId) -> bool {
        let sink = {
            let mut pending = self.lock();
            let sink = pending.remove(&id);
            self.leaks.observe(pending.len());
            sink
        };
        // The sink is dropped here, after the lock is released.
        sink.is_some()
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        self.lock().contains_key(&id)
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

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, ResponseSink>> {
        self.pending
            .lock()
            .expect("correlation registry mutex poisoned")
    }
}

impl fmt::Debug for CorrelationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationRegistry")
            .field("pending", &self.len())
            .field("leaks", &self.leaks)
            .finish()
    }
}
