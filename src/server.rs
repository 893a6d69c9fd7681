//! Callee side of the protocol: the dispatcher, the disposal-guarded channels it hands to
//! targets, and the target lookup.

pub mod callbacks;
pub mod dispatcher;
pub mod target;

pub use callbacks::{InvocationContext, OutcomeSink, PendingAnswer, ProgressSink, QuestionSink};
pub use dispatcher::{InvocationDispatcher, InvocationDispatcherParams};
pub use target::{AsyncTarget, InvocationTarget, TargetFuture, TargetRegistry};
