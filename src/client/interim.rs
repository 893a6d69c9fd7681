//! Calling-side callback contracts and the adapter that answers the callee's questions.

use super::progress::ProgressMonitor;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::InvocationId;
use crate::runtime::telemetry::Telemetry;
use crate::transport::{InterimRequestHandler, Transport};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Receives the outcome of an asynchronous call. Passing one to a proxy call makes the call
/// asynchronous.
pub trait CompletionCallback: Send + Sync {
    fn finished(&self, value: Value);

    fn failed(&self, error: InvocationError);

    fn timed_out(&self) {
        self.failed(InvocationError::Timeout);
    }

    /// Secondary problems that do not end the call, such as a question nobody could answer.
    fn warning(&self, warning: InvocationError) {
        tracing::warn!(warning = %warning, "invocation reported a warning");
    }
}

/// Opts a proxy call into progress reporting, question answering and caller-side cancel.
pub trait ExecutionCallback: ProgressMonitor {
    /// Answers a question from the callee. `None` means no answer is available and the
    /// configured default answer is used instead.
    fn answer(&self, _question: &Value) -> Option<Value> {
        None
    }

    /// Called once, before the call is submitted.
    fn attach(&self, _handle: InvocationHandle) {}
}

/// Caller-side handle to a submitted invocation.
#[derive(Clone)]
pub struct InvocationHandle {
    id: InvocationId,
    transport: Arc<dyn Transport>,
}

impl InvocationHandle {
    pub(crate) fn new(id: InvocationId, transport: Arc<dyn Transport>) -> Self {
        Self { id, transport }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    /// Requests cancellation. Harmless once the invocation has ended.
    pub fn cancel(&self) {
        self.transport.notify_cancel(&self.id);
    }
}

impl fmt::Debug for InvocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("id", &self.id)
            .finish()
    }
}

/// Answers interim requests on behalf of the caller: the execution callback answers when it
/// can, otherwise the default answer is used and the completion callback is warned.
pub(crate) struct QuestionAdapter {
    execution: Option<Arc<dyn ExecutionCallback>>,
    completion: Option<Arc<dyn CompletionCallback>>,
    default_answer: Value,
    telemetry: Option<Arc<Telemetry>>,
}

impl QuestionAdapter {
    pub(crate) fn new(
        execution: Option<Arc<dyn ExecutionCallback>>,
        completion: Option<Arc<dyn CompletionCallback>>,
        default_answer: Value,
    ) -> Self {
        Self {
            execution,
            completion,
            default_answer,
            telemetry: None,
        }
    }

    pub(crate) fn with_telemetry(mut self, telemetry: Option<Arc<Telemetry>>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

impl InterimRequestHandler for QuestionAdapter {
    fn interim_request(&self, question: &Value) -> Value {
        if let Some(answer) = self
            .execution
            .as_ref()
            .and_then(|execution| execution.answer(question))
        {
            return answer;
        }

        tracing::warn!(
            question = %question,
            answer = %self.default_answer,
            "question asked but no handler can answer it; using default answer"
        );
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_unanswered_question();
        }
        if let Some(completion) = &self.completion {
            completion.warning(InvocationError::UnansweredQuestion {
                question: question.clone(),
                answer: self.default_answer.clone(),
            });
        }
        self.default_answer.clone()
    }
}
