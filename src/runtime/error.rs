use serde_json::Value;
use std::fmt;

/// Failure surfaced through the outcome channel of a single invocation.
#[derive(Debug)]
pub enum InvocationError {
    /// The target could not even be started (lookup failure, panic while starting, ...).
    Initiation {
        target: String,
        operation: String,
        reason: String,
    },
    /// The proxy was asked for an operation its target does not declare.
    UnknownOperation { operation: String },
    /// The operation ran and raised an error.
    Operation(anyhow::Error),
    /// The transport gave up waiting for an outcome.
    Timeout,
    /// The invocation was cancelled before an outcome was delivered.
    Cancelled,
    /// A question was asked but nobody on the calling side could answer it.
    UnansweredQuestion { question: Value, answer: Value },
    /// A failure delivered by the remote side, wrapped for a blocking caller.
    Remote(Box<InvocationError>),
}

impl InvocationError {
    pub fn initiation(
        target: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Initiation {
            target: target.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Strips any number of [`InvocationError::Remote`] wrappers.
    pub fn root(&self) -> &InvocationError {
        match self {
            Self::Remote(inner) => inner.root(),
            other => other,
        }
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiation {
                target,
                operation,
                reason,
            } => write!(f, "failed to start {target}::{operation}: {reason}"),
            Self::UnknownOperation { operation } => {
                write!(f, "operation {operation} is not declared by the target")
            }
            Self::Operation(source) => write!(f, "operation failed: {source}"),
            Self::Timeout => write!(f, "invocation timed out"),
            Self::Cancelled => write!(f, "invocation was cancelled"),
            Self::UnansweredQuestion { question, answer } => write!(
                f,
                "question {question} was asked but no handler was registered; answered {answer}"
            ),
            Self::Remote(inner) => write!(f, "remote invocation failed: {inner}"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(source) => Some(&**source),
            Self::Remote(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for InvocationError {
    fn from(error: anyhow::Error) -> Self {
        Self::Operation(error)
    }
}
