//! Seams between the protocol and whatever carries its messages.
//!
//! [`Transport`] is what the calling side submits through; [`CallerLink`] is what the
//! dispatcher on the callee side reports back through. [`local::LocalTransport`] implements
//! both in-process.

pub mod local;

use crate::client::interim::CompletionCallback;
use crate::registry::CorrelationId;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::{InvocationId, InvocationParameter, ProgressSnapshot};
use serde_json::Value;
use std::sync::Arc;

pub use local::LocalTransport;

/// Receives the absolute progress snapshots of one invocation on the calling side.
pub trait InterimResponseHandler: Send + Sync {
    fn interim_response(&self, snapshot: &ProgressSnapshot);
}

/// Answers the questions one invocation asks on the calling side.
pub trait InterimRequestHandler: Send + Sync {
    fn interim_request(&self, question: &Value) -> Value;
}

/// Where the transport delivers everything that comes back for one submitted call.
#[derive(Clone)]
pub struct CallRouting {
    pub outcome: Arc<dyn CompletionCallback>,
    pub progress: Arc<dyn InterimResponseHandler>,
    pub questions: Arc<dyn InterimRequestHandler>,
}

/// Calling-side view of the transport.
pub trait Transport: Send + Sync {
    /// Allocates an id that is not in use by any active invocation.
    fn next_invocation_id(&self) -> InvocationId;

    /// Starts a call. Must not block on the outcome.
    fn submit(&self, id: InvocationId, parameter: InvocationParameter, routing: CallRouting);

    /// Returns the answer to a question previously delivered through the routing.
    fn respond(&self, correlation: CorrelationId, answer: Value);

    /// Requests cancellation of `id`.
    fn notify_cancel(&self, id: &InvocationId);
}

/// Callee-side view of the transport, used by the dispatcher.
pub trait CallerLink: Send + Sync {
    fn finished(&self, id: &InvocationId, value: Value);

    fn failed(&self, id: &InvocationId, error: InvocationError);

    fn interim_response(&self, id: &InvocationId, snapshot: ProgressSnapshot);

    fn interim_request(&self, id: &InvocationId, correlation: CorrelationId, question: Value);

    /// The callee cancelled `id` on its own initiative.
    fn cancelled(&self, id: &InvocationId);
}
