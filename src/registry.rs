//! Process-wide registries shared by every invocation: cancellation listeners keyed by
//! invocation id, pending questions keyed by correlation id, and the leak diagnostics both
//! of them report through.

pub mod cancel;
pub mod correlation;
pub mod leak;

pub use cancel::{CancelListener, CancellationCoordinator};
pub use correlation::{CorrelationId, CorrelationRegistry, ResponseSink};
pub use leak::{LeakDetector, LeakWarning};
