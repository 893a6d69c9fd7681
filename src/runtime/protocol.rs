use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of one in-flight invocation, supplied by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(Arc<str>);

impl InvocationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Arc::from(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InvocationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InvocationId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Declared shape of one operation exposed by a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub parameter_types: Vec<String>,
}

impl OperationDescriptor {
    pub fn new<I, S>(name: impl Into<String>, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parameter_types: parameter_types.into_iter().map(Into::into).collect(),
        }
    }
}

/// Payload handed to the transport for one call.
///
/// Callback-typed arguments never travel: their positions hold `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationParameter {
    pub target_id: String,
    pub operation: String,
    pub parameter_types: Vec<String>,
    pub args: Vec<Value>,
}

impl InvocationParameter {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }
}

/// Absolute progress state reported by a running operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub description: Option<String>,
    pub total_steps: Option<u64>,
    pub total_worked: Option<u64>,
    pub finished: bool,
}

impl ProgressSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn total_steps(mut self, steps: u64) -> Self {
        self.total_steps = Some(steps);
        self
    }

    pub fn total_worked(mut self, worked: u64) -> Self {
        self.total_worked = Some(worked);
        self
    }

    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }
}
