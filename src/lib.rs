pub mod client;
pub mod registry;
pub mod runtime;
pub mod server;
pub mod transport;

pub use client::{
    Argument, CallOutcome, CompletionCallback, ExecutionCallback, InvocationHandle,
    InvocationProxy, ProgressDeltaAdapter, ProgressMonitor, ResultWaiter, SyncBridge,
    TargetDescriptor,
};
pub use registry::{
    CancelListener, CancellationCoordinator, CorrelationId, CorrelationRegistry, LeakDetector,
    LeakWarning,
};
pub use runtime::config::{ProtocolConfig, ProtocolConfigBuilder, ProtocolConfigParams};
pub use runtime::error::InvocationError;
pub use runtime::protocol::{
    InvocationId, InvocationParameter, OperationDescriptor, ProgressSnapshot,
};
pub use runtime::telemetry::{init_tracing, spawn_metrics_reporter, Telemetry, TelemetrySnapshot};
pub use server::{
    AsyncTarget, InvocationContext, InvocationDispatcher, InvocationTarget, TargetFuture,
    TargetRegistry,
};
pub use transport::{CallRouting, CallerLink, LocalTransport, Transport};
