//! In-process transport: submits straight into an [`InvocationDispatcher`] running on the
//! same tokio runtime and routes everything coming back to the caller's callbacks.

use super::{CallRouting, CallerLink, Transport};
use crate::registry::{CancelListener, CancellationCoordinator, CorrelationId};
use crate::runtime::config::ProtocolConfig;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::{InvocationId, InvocationParameter, ProgressSnapshot};
use crate::server::InvocationDispatcher;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

struct PendingCall {
    routing: CallRouting,
    timer: CancellationToken,
}

/// Loopback [`Transport`] and [`CallerLink`].
///
/// Every submitted call stays in the pending table until exactly one terminal outcome has been
/// handed to its completion callback: the callee's result, a cancel, or the timeout. Whatever
/// arrives for a call after that is dropped.
pub struct LocalTransport {
    me: Weak<LocalTransport>,
    dispatcher: Arc<InvocationDispatcher>,
    runtime: Handle,
    invocation_timeout: Duration,
    next_id: AtomicU64,
    pending: Mutex<HashMap<InvocationId, PendingCall>>,
    cancels: CancellationCoordinator,
}

impl LocalTransport {
    pub fn new(
        dispatcher: Arc<InvocationDispatcher>,
        config: &ProtocolConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        let invocation_timeout = config.invocation_timeout();
        let cancels = CancellationCoordinator::with_threshold(config.invocation_leak_threshold());
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            dispatcher,
            runtime,
            invocation_timeout,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            cancels,
        })
    }

    pub fn dispatcher(&self) -> &Arc<InvocationDispatcher> {
        &self.dispatcher
    }

    /// Number of submitted calls still waiting for their outcome.
    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<InvocationId, PendingCall>> {
        self.pending.lock().expect("pending call table mutex poisoned")
    }

    fn is_pending(&self, id: &InvocationId) -> bool {
        self.pending().contains_key(id)
    }

    /// Removes the call so that no other outcome can be delivered for it.
    fn take(&self, id: &InvocationId) -> Option<PendingCall> {
        let call = self.pending().remove(id)?;
        call.timer.cancel();
        self.cancels.unregister_invocation(id);
        Some(call)
    }

    fn routing(&self, id: &InvocationId) -> Option<CallRouting> {
        self.pending().get(id).map(|call| call.routing.clone())
    }

    fn expire(&self, id: &InvocationId) {
        let Some(call) = self.take(id) else {
            return;
        };
        self.dispatcher.telemetry().record_timed_out();
        tracing::warn!(
            invocation = %id,
            timeout = ?self.invocation_timeout,
            "invocation timed out"
        );
        call.routing.outcome.timed_out();
        self.dispatcher.cancel(id);
    }

    fn spawn_timer(&self, id: InvocationId, timer: CancellationToken) {
        let me = self.me.clone();
        let timeout = self.invocation_timeout;
        self.runtime.spawn(async move {
            select! {
                _ = timer.cancelled() => {}
                _ = time::sleep(timeout) => {
                    if let Some(transport) = me.upgrade() {
                        transport.expire(&id);
                    }
                }
            }
        });
    }
}

impl Transport for LocalTransport {
    fn next_invocation_id(&self) -> InvocationId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        InvocationId::new(format!("inv-{n}"))
    }

    fn submit(&self, id: InvocationId, parameter: InvocationParameter, routing: CallRouting) {
        let Some(link) = self.me.upgrade() else {
            routing.outcome.failed(InvocationError::initiation(
                parameter.target_id.as_str(),
                parameter.operation.as_str(),
                "transport is shutting down",
            ));
            return;
        };

        let timer = CancellationToken::new();
        self.pending().insert(
            id.clone(),
            PendingCall {
                routing,
                timer: timer.clone(),
            },
        );

        self.cancels.register_invocation(id.clone());
        let me = self.me.clone();
        let on_cancel: Arc<dyn CancelListener> = Arc::new(move |id: &InvocationId| {
            let Some(transport) = me.upgrade() else {
                return;
            };
            if let Some(call) = transport.take(id) {
                tracing::debug!(invocation = %id, "call cancelled");
                call.routing.outcome.failed(InvocationError::Cancelled);
            }
        });
        self.cancels.register_cancel_listener(&id, on_cancel);
        self.spawn_timer(id.clone(), timer);

        let dispatcher = self.dispatcher.clone();
        self.runtime.spawn_blocking(move || {
            if !link.is_pending(&id) {
                tracing::debug!(invocation = %id, "call ended before dispatch; skipping");
                return;
            }
            dispatcher.invoke(id.clone(), parameter, link.clone());
            // A cancel or timeout between the check and `invoke` found nothing to cancel.
            if !link.is_pending(&id) {
                dispatcher.cancel(&id);
            }
        });
    }

    fn respond(&self, correlation: CorrelationId, answer: Value) {
        if !self.dispatcher.respond(correlation, answer) {
            tracing::debug!(%correlation, "answer arrived for a question nobody waits on");
        }
    }

    fn notify_cancel(&self, id: &InvocationId) {
        // Ends the call before reaching the callee; the dispatch task relies on this order.
        self.cancels.cancel(id);
        self.dispatcher.cancel(id);
    }
}

impl CallerLink for LocalTransport {
    fn finished(&self, id: &InvocationId, value: Value) {
        match self.take(id) {
            Some(call) => call.routing.outcome.finished(value),
            None => tracing::debug!(invocation = %id, "dropping result of an ended call"),
        }
    }

    fn failed(&self, id: &InvocationId, error: InvocationError) {
        match self.take(id) {
            Some(call) => call.routing.outcome.failed(error),
            None => tracing::debug!(
                invocation = %id,
                error = %error,
                "dropping failure of an ended call"
            ),
        }
    }

    fn interim_response(&self, id: &InvocationId, snapshot: ProgressSnapshot) {
        if let Some(routing) = self.routing(id) {
            routing.progress.interim_response(&snapshot);
        }
    }

    fn interim_request(&self, id: &InvocationId, correlation: CorrelationId, question: Value) {
        let Some(routing) = self.routing(id) else {
            tracing::debug!(invocation = %id, %correlation, "question for an ended call ignored");
            return;
        };

        let dispatcher = self.dispatcher.clone();
        self.runtime.spawn_blocking(move || {
            let answer = routing.questions.interim_request(&question);
            dispatcher.respond(correlation, answer);
        });
    }

    fn cancelled(&self, id: &InvocationId) {
        self.cancels.cancel(id);
    }
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport")
            .field("pending", &self.pending_len())
            .field("invocation_timeout", &self.invocation_timeout)
            .finish()
    }
}
