//! Callee-side orchestration of a single invocation: builds its callback channels, ties them
//! to the cancellation coordinator, and starts the target.

use super::callbacks::{InvocationContext, InvocationShared, InvocationSharedParams};
use super::target::TargetRegistry;
use crate::registry::{
    CancelListener, CancellationCoordinator, CorrelationId, CorrelationRegistry, LeakDetector,
};
use crate::runtime::config::ProtocolConfig;
use crate::runtime::error::InvocationError;
use crate::runtime::protocol::{InvocationId, InvocationParameter};
use crate::runtime::telemetry::{self, Telemetry};
use crate::transport::CallerLink;
use serde_json::Value;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct InvocationDispatcher {
    targets: Arc<TargetRegistry>,
    coordinator: Arc<CancellationCoordinator>,
    correlations: Arc<CorrelationRegistry>,
    telemetry: Arc<Telemetry>,
    metrics_interval: Duration,
}

pub struct InvocationDispatcherParams {
    pub targets: Arc<TargetRegistry>,
    pub coordinator: Arc<CancellationCoordinator>,
    pub correlations: Arc<CorrelationRegistry>,
    pub telemetry: Arc<Telemetry>,
    pub metrics_interval: Duration,
}

impl InvocationDispatcher {
    /// Builds a dispatcher with its own registries sized from `config`.
    pub fn new(targets: Arc<TargetRegistry>, config: &ProtocolConfig) -> Self {
        let telemetry = Arc::new(Telemetry::default());
        let coordinator = CancellationCoordinator::new(
            LeakDetector::new("invocations", config.invocation_leak_threshold())
                .with_telemetry(telemetry.clone()),
        );
        let correlations = CorrelationRegistry::new(
            LeakDetector::new("correlations", config.correlation_leak_threshold())
                .with_telemetry(telemetry.clone()),
        );

        Self::with_params(InvocationDispatcherParams {
            targets,
            coordinator: Arc::new(coordinator),
            correlations: Arc::new(correlations),
            telemetry,
            metrics_interval: config.metrics_interval(),
        })
    }

    pub fn with_params(params: InvocationDispatcherParams) -> Self {
        Self {
            targets: params.targets,
            coordinator: params.coordinator,
            correlations: params.correlations,
            telemetry: params.telemetry,
            metrics_interval: params.metrics_interval,
        }
    }

    /// Logs this dispatcher's counters and registry sizes every `metrics_interval` until
    /// `shutdown` fires.
    pub fn spawn_metrics_reporter(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.coordinator.clone(),
            self.correlations.clone(),
            shutdown,
            self.metrics_interval,
        )
    }

    /// Starts invocation `id`. Never fails: a target that cannot be started is reported
    /// through the invocation's own outcome channel.
    pub fn invoke(
        &self,
        id: InvocationId,
        parameter: InvocationParameter,
        caller: Arc<dyn CallerLink>,
    ) {
        let shared = InvocationShared::new(InvocationSharedParams {
            id: id.clone(),
            caller,
            coordinator: self.coordinator.clone(),
            correlations: self.correlations.clone(),
            telemetry: self.telemetry.clone(),
        });
        let context = InvocationContext::new(shared.clone());

        self.coordinator.register_invocation(id.clone());
        let telemetry = self.telemetry.clone();
        let on_cancel: Arc<dyn CancelListener> = Arc::new(move |id: &InvocationId| {
            if shared.dispose() {
                telemetry.record_cancelled();
                tracing::debug!(invocation = %id, "invocation cancelled");
            }
        });
        self.coordinator.register_cancel_listener(&id, on_cancel);
        self.telemetry.record_started();

        let target_id = parameter.target_id.clone();
        let operation = parameter.operation.clone();
        tracing::debug!(
            invocation = %id,
            target = %target_id,
            operation = %operation,
            "dispatching invocation"
        );

        let outcome = context.outcome().clone();
        let started = match self.targets.get(&target_id) {
            Some(target) => catch_unwind(AssertUnwindSafe(|| target.invoke(context, parameter)))
                .unwrap_or_else(|payload| {
                    Err(InvocationError::initiation(
                        target_id.as_str(),
                        operation.as_str(),
                        format!("target panicked: {}", panic_message(payload.as_ref())),
                    ))
                }),
            None => Err(InvocationError::initiation(
                target_id.as_str(),
                operation.as_str(),
                "no target registered under this id",
            )),
        };

        if let Err(error) = started {
            self.telemetry.record_initiation_failure();
            tracing::warn!(invocation = %id, error = %error, "invocation could not be started");
            outcome.failed(error);
        }
    }

    /// Routes an answer from the caller to the question waiting on `correlation`.
    pub fn respond(&self, correlation: CorrelationId, answer: Value) -> bool {
        self.correlations.deliver(correlation, answer)
    }

    /// Cancels `id` on behalf of the caller.
    pub fn cancel(&self, id: &InvocationId) -> bool {
        self.coordinator.cancel(id)
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    pub fn coordinator(&self) -> &Arc<CancellationCoordinator> {
        &self.coordinator
    }

    pub fn correlations(&self) -> &Arc<CorrelationRegistry> {
        &self.correlations
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
