//! Calling side of the protocol: the proxy, the argument classifier, the blocking bridge and
//! the adapters that turn interim messages into calls on caller-supplied callbacks.

pub mod args;
pub mod interim;
pub mod progress;
pub mod proxy;
pub mod sync_bridge;

pub use args::Argument;
pub use interim::{CompletionCallback, ExecutionCallback, InvocationHandle};
pub use progress::{ProgressDeltaAdapter, ProgressMonitor};
pub use proxy::{CallOutcome, InvocationProxy, TargetDescriptor};
pub use sync_bridge::{ResultWaiter, SyncBridge};
