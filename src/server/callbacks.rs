//! The three callback channels handed to a running operation.
//!
//! All three share one [`InvocationShared`] cell. Whichever of cancel, finish or failure comes
//! first flips its disposal flag; from then on every channel is inert.
//!
//! Progress and questions are forwarded under the read side of a gate. The outcome, and a
//! callee-side cancel notice, are forwarded under its write side, so neither can overtake a
//! forward that passed the disposal check before them.

use crate::registry::{CancellationCoordinator, CorrelationId, CorrelationRegistry};
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::{InvocationId, ProgressSnapshot};
use crate::runtime::telemetry::Telemetry;
use crate::transport::CallerLink;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

pub(crate) struct InvocationShared {
    id: InvocationId,
    disposed: AtomicBool,
    gate: RwLock<()>,
    open_questions: Mutex<HashSet<CorrelationId>>,
    token: CancellationToken,
    caller: Arc<dyn CallerLink>,
    coordinator: Arc<CancellationCoordinator>,
    correlations: Arc<CorrelationRegistry>,
    telemetry: Arc<Telemetry>,
}

pub(crate) struct InvocationSharedParams {
    pub id: InvocationId,
    pub caller: Arc<dyn CallerLink>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub correlations: Arc<CorrelationRegistry>,
    pub telemetry: Arc<Telemetry>,
}

impl InvocationShared {
    pub(crate) fn new(params: InvocationSharedParams) -> Arc<Self> {
        Arc::new(Self {
            id: params.id,
            disposed: AtomicBool::new(false),
            gate: RwLock::new(()),
            open_questions: Mutex::new(HashSet::new()),
            token: CancellationToken::new(),
            caller: params.caller,
            coordinator: params.coordinator,
            correlations: params.correlations,
            telemetry: params.telemetry,
        })
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Marks every channel inert. Only the first caller gets `true`.
    ///
    /// Does not wait for forwards in flight, so it is safe to reach from inside one (a progress
    /// monitor cancelling its own call, for instance).
    pub(crate) fn dispose(&self) -> bool {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.token.cancel();
        let open: Vec<CorrelationId> = self.open_questions().drain().collect();
        for correlation in open {
            self.correlations.unregister(correlation);
        }
        true
    }

    /// Admits one progress or question forward, or `None` once disposed. Hold the guard until
    /// the forward has returned.
    fn admit(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let gate = self.gate.read().expect("invocation gate poisoned");
        if self.is_disposed() {
            return None;
        }
        Some(gate)
    }

    /// Waits for every admitted forward to return. Call after `dispose` and hold the guard
    /// while forwarding the terminal event.
    fn quiesce(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().expect("invocation gate poisoned")
    }

    fn open_questions(&self) -> MutexGuard<'_, HashSet<CorrelationId>> {
        self.open_questions
            .lock()
            .expect("open question set mutex poisoned")
    }
}

/// Final-outcome channel. The first delivery wins; later ones return `false`.
#[derive(Clone)]
pub struct OutcomeSink {
    shared: Arc<InvocationShared>,
}

impl OutcomeSink {
    pub fn finished(&self, value: Value) -> bool {
        let shared = &self.shared;
        if !shared.dispose() {
            tracing::debug!(invocation = %shared.id, "result dropped; invocation already disposed");
            return false;
        }

        shared.telemetry.record_finished();
        tracing::debug!(invocation = %shared.id, "invocation finished");
        let _quiet = shared.quiesce();
        shared.caller.finished(&shared.id, value);
        shared.coordinator.unregister_invocation(&shared.id);
        true
    }

    pub fn failed(&self, error: impl Into<InvocationError>) -> bool {
        let shared = &self.shared;
        let error = error.into();
        if !shared.dispose() {
            tracing::debug!(
                invocation = %shared.id,
                error = %error,
                "failure dropped; invocation already disposed"
            );
            return false;
        }

        shared.telemetry.record_failed();
        tracing::debug!(invocation = %shared.id, error = %error, "invocation failed");
        let _quiet = shared.quiesce();
        shared.caller.failed(&shared.id, error);
        shared.coordinator.unregister_invocation(&shared.id);
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }
}

/// Outbound progress channel.
#[derive(Clone)]
pub struct ProgressSink {
    shared: Arc<InvocationShared>,
}

impl ProgressSink {
    /// Forwards `snapshot` to the caller. Returns `false` once the invocation is disposed.
    pub fn push(&self, snapshot: ProgressSnapshot) -> bool {
        let shared = &self.shared;
        let Some(_admitted) = shared.admit() else {
            shared.telemetry.record_dropped_progress();
            return false;
        };
        shared.caller.interim_response(&shared.id, snapshot);
        true
    }
}

/// Inbound question channel.
#[derive(Clone)]
pub struct QuestionSink {
    shared: Arc<InvocationShared>,
}

impl QuestionSink {
    /// Sends `question` to the caller. The returned future resolves with the answer, or with
    /// [`InvocationError::Cancelled`] if the invocation is disposed first.
    pub fn ask(&self, question: Value) -> PendingAnswer {
        let shared = &self.shared;
        let (tx, rx) = oneshot::channel();

        let Some(_admitted) = shared.admit() else {
            tracing::debug!(
                invocation = %shared.id,
                "question dropped; invocation already disposed"
            );
            return PendingAnswer { rx };
        };
        let correlation = {
            let mut open = shared.open_questions();
            // Checked under the open-question lock so `dispose` cannot miss this entry.
            if shared.is_disposed() {
                tracing::debug!(
                    invocation = %shared.id,
                    "question dropped; invocation already disposed"
                );
                return PendingAnswer { rx };
            }

            let assigned = Arc::new(OnceLock::new());
            let sink_id = assigned.clone();
            let owner = Arc::downgrade(&self.shared);
            let correlation = shared.correlations.register(Box::new(move |answer| {
                if let (Some(owner), Some(correlation)) = (owner.upgrade(), sink_id.get()) {
                    owner.open_questions().remove(correlation);
                    owner.telemetry.record_question_answered();
                }
                let _ = tx.send(answer);
            }));
            let _ = assigned.set(correlation);
            open.insert(correlation);
            correlation
        };

        shared.telemetry.record_question_asked();
        tracing::debug!(invocation = %shared.id, correlation = %correlation, "forwarding question");
        shared
            .caller
            .interim_request(&shared.id, correlation, question);
        PendingAnswer { rx }
    }
}

/// Answer to a question asked through a [`QuestionSink`].
#[derive(Debug)]
pub struct PendingAnswer {
    rx: oneshot::Receiver<Value>,
}

impl PendingAnswer {
    /// Blocks the current thread until the answer arrives. Must not be called from within an
    /// async context.
    pub fn blocking_wait(self) -> Result<Value, InvocationError> {
        self.rx.blocking_recv().map_err(|_| InvocationError::Cancelled)
    }
}

impl Future for PendingAnswer {
    type Output = Result<Value, InvocationError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| InvocationError::Cancelled))
    }
}

/// Everything a target needs to run one invocation.
#[derive(Clone)]
pub struct InvocationContext {
    shared: Arc<InvocationShared>,
    outcome: OutcomeSink,
    progress: ProgressSink,
    questions: QuestionSink,
}

impl InvocationContext {
    pub(crate) fn new(shared: Arc<InvocationShared>) -> Self {
        Self {
            outcome: OutcomeSink {
                shared: shared.clone(),
            },
            progress: ProgressSink {
                shared: shared.clone(),
            },
            questions: QuestionSink {
                shared: shared.clone(),
            },
            shared,
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.shared.id
    }

    pub fn outcome(&self) -> &OutcomeSink {
        &self.outcome
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    pub fn questions(&self) -> &QuestionSink {
        &self.questions
    }

    /// Token cancelled as soon as the invocation is disposed, by cancellation or by an outcome.
    /// Long-running targets should watch it and stop early.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Cancels the invocation from the callee side and tells the caller about it.
    pub fn request_cancel(&self) -> bool {
        let shared = &self.shared;
        if !shared.coordinator.cancel(&shared.id) {
            return false;
        }
        tracing::debug!(invocation = %shared.id, "callee requested cancellation");
        let _quiet = shared.quiesce();
        shared.caller.cancelled(&shared.id);
        true
    }
}
