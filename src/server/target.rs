use super::callbacks::InvocationContext;
use super::dispatcher::panic_message;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::InvocationParameter;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tokio::runtime::Handle;

pub type TargetFuture = BoxFuture<'static, anyhow::Result<Value>>;

/// Implementation side of an operation interface.
///
/// `invoke` only has to *start* the work. The outcome is reported later through
/// `context.outcome()`, exactly once. An `Err` returned here is an initiation failure and is
/// reported on the target's behalf.
pub trait InvocationTarget: Send + Sync + 'static {
    fn invoke(
        &self,
        context: InvocationContext,
        parameter: InvocationParameter,
    ) -> Result<(), InvocationError>;
}

/// Adapts an async handler into an [`InvocationTarget`] by spawning it on the current tokio
/// runtime and reporting its result as the outcome. A handler that panics is reported as a
/// failed operation.
pub struct AsyncTarget<F> {
    handler: F,
}

impl<F> AsyncTarget<F>
where
    F: Fn(InvocationContext, InvocationParameter) -> TargetFuture + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> InvocationTarget for AsyncTarget<F>
where
    F: Fn(InvocationContext, InvocationParameter) -> TargetFuture + Send + Sync + 'static,
{
    fn invoke(
        &self,
        context: InvocationContext,
        parameter: InvocationParameter,
    ) -> Result<(), InvocationError> {
        let runtime = Handle::try_current().map_err(|err| {
            InvocationError::initiation(
                parameter.target_id.as_str(),
                parameter.operation.as_str(),
                format!("no tokio runtime available: {err}"),
            )
        })?;

        let outcome = context.outcome().clone();
        let future = (self.handler)(context, parameter);
        runtime.spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => outcome.finished(value),
                Ok(Err(err)) => outcome.failed(err),
                Err(payload) => outcome.failed(anyhow::anyhow!(
                    "operation panicked: {}",
                    panic_message(payload.as_ref())
                )),
            };
        });
        Ok(())
    }
}

/// Callee-side lookup of targets by id.
#[derive(Default)]
pub struct TargetRegistry {
    targets: RwLock<HashMap<String, Arc<dyn InvocationTarget>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `target` under `target_id`, returning the target it replaced.
    pub fn register(
        &self,
        target_id: impl Into<String>,
        target: Arc<dyn InvocationTarget>,
    ) -> Option<Arc<dyn InvocationTarget>> {
        self.targets
            .write()
            .expect("target registry lock poisoned")
            .insert(target_id.into(), target)
    }

    pub fn remove(&self, target_id: &str) -> Option<Arc<dyn InvocationTarget>> {
        self.targets
            .write()
            .expect("target registry lock poisoned")
            .remove(target_id)
    }

    pub fn get(&self, target_id: &str) -> Option<Arc<dyn InvocationTarget>> {
        self.targets
            .read()
            .expect("target registry lock poisoned")
            .get(target_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.read().expect("target registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
