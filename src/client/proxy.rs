//! Calling-side entry point. A proxy stands for one remote target and turns calls made against
//! it into submitted invocations, blocking or not depending on the callbacks supplied.

use super::args::{classify, Argument};
use super::interim::{CompletionCallback, ExecutionCallback, InvocationHandle, QuestionAdapter};
use super::progress::{DiscardProgress, ProgressDeltaAdapter};
use super::sync_bridge::SyncBridge;
use crate::runtime::config::ProtocolConfig;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::{InvocationId, InvocationParameter, OperationDescriptor};
use crate::runtime::telemetry::Telemetry;
use crate::transport::{CallRouting, InterimResponseHandler, Transport};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Declared interface of a remote target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub target_id: String,
    pub interface: String,
    pub operations: Vec<OperationDescriptor>,
}

impl TargetDescriptor {
    pub fn new(target_id: impl Into<String>, interface: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            interface: interface.into(),
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: OperationDescriptor) -> Self {
        self.operations.push(operation);
        self
    }

    /// Finds the operation named `name` taking `arity` arguments.
    pub fn find(&self, name: &str, arity: usize) -> Option<&OperationDescriptor> {
        self.operations
            .iter()
            .find(|op| op.name == name && op.parameter_types.len() == arity)
    }
}

/// Result of a proxy call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Submitted asynchronously; the outcome goes to the completion callback.
    Dispatched(InvocationId),
    /// Completed synchronously with this value.
    Returned(Value),
}

impl CallOutcome {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Returned(value) => Some(value),
            Self::Dispatched(_) => None,
        }
    }
}

/// Client-side stand-in for a remote target.
///
/// Equality, hashing and formatting are answered locally from the shared descriptor and never
/// reach the transport. Clones of one proxy are equal; proxies built from separate descriptors
/// are not, even when the descriptors have equal content.
#[derive(Clone)]
pub struct InvocationProxy {
    descriptor: Arc<TargetDescriptor>,
    transport: Arc<dyn Transport>,
    default_answer: Value,
    telemetry: Option<Arc<Telemetry>>,
}

impl InvocationProxy {
    pub fn new(
        descriptor: TargetDescriptor,
        transport: Arc<dyn Transport>,
        config: &ProtocolConfig,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            transport,
            default_answer: config.default_answer().clone(),
            telemetry: None,
        }
    }

    /// Counts questions this proxy had to answer with the default answer.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn descriptor(&self) -> &TargetDescriptor {
        &self.descriptor
    }

    /// Invokes `operation` with `args`.
    ///
    /// With a completion callback among the arguments the call is submitted and this returns
    /// [`CallOutcome::Dispatched`] at once. Without one the calling thread blocks until the
    /// outcome arrives, so it must not be called from an async context in that mode.
    pub fn call(
        &self,
        operation: &str,
        args: Vec<Argument>,
    ) -> Result<CallOutcome, InvocationError> {
        let declared = self
            .descriptor
            .find(operation, args.len())
            .ok_or_else(|| InvocationError::UnknownOperation {
                operation: operation.to_owned(),
            })?;

        let classified = classify(args);
        let progress: Arc<dyn InterimResponseHandler> = match &classified.execution {
            Some(execution) => Arc::new(ProgressDeltaAdapter::new(execution.clone())),
            None => Arc::new(DiscardProgress),
        };
        let questions = Arc::new(
            QuestionAdapter::new(
                classified.execution.clone(),
                classified.completion.clone(),
                self.default_answer.clone(),
            )
            .with_telemetry(self.telemetry.clone()),
        );

        let parameter = InvocationParameter {
            target_id: self.descriptor.target_id.clone(),
            operation: declared.name.clone(),
            parameter_types: declared.parameter_types.clone(),
            args: classified.values,
        };

        let id = self.transport.next_invocation_id();
        let routing = |outcome: Arc<dyn CompletionCallback>| CallRouting {
            outcome,
            progress,
            questions,
        };

        match classified.completion {
            Some(completion) => {
                tracing::debug!(invocation = %id, operation, "submitting asynchronous call");
                self.transport.submit(id.clone(), parameter, routing(completion));
                self.attach(classified.execution.as_ref(), &id);
                Ok(CallOutcome::Dispatched(id))
            }
            None => {
                tracing::debug!(invocation = %id, operation, "submitting blocking call");
                let (bridge, waiter) = SyncBridge::channel();
                self.transport.submit(id.clone(), parameter, routing(bridge));
                self.attach(classified.execution.as_ref(), &id);
                waiter.await_result().map(CallOutcome::Returned)
            }
        }
    }

    /// Hands the cancel handle out only once the transport tracks `id`, so a cancel issued
    /// from `attach` is never lost.
    fn attach(&self, execution: Option<&Arc<dyn ExecutionCallback>>, id: &InvocationId) {
        if let Some(execution) = execution {
            execution.attach(InvocationHandle::new(id.clone(), self.transport.clone()));
        }
    }
}

impl PartialEq for InvocationProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.descriptor, &other.descriptor)
    }
}

impl Eq for InvocationProxy {}

impl Hash for InvocationProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.descriptor).hash(state);
    }
}

impl fmt::Display for InvocationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "proxy for {} at {}",
            self.descriptor.interface, self.descriptor.target_id
        )
    }
}

impl fmt::Debug for InvocationProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationProxy")
            .field("target_id", &self.descriptor.target_id)
            .field("interface", &self.descriptor.interface)
            .finish()
    }
}
