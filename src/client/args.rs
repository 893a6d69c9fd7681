use super::interim::{CompletionCallback, ExecutionCallback};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// One argument of a proxy call. Callback arguments are classified by their variant and
/// never leave the calling process.
#[derive(Clone)]
pub enum Argument {
    Value(Value),
    Completion(Arc<dyn CompletionCallback>),
    Execution(Arc<dyn ExecutionCallback>),
}

impl Argument {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }

    pub fn completion(callback: Arc<dyn CompletionCallback>) -> Self {
        Self::Completion(callback)
    }

    pub fn execution(callback: Arc<dyn ExecutionCallback>) -> Self {
        Self::Execution(callback)
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Completion(_) => f.write_str("Completion(..)"),
            Self::Execution(_) => f.write_str("Execution(..)"),
        }
    }
}

/// Call arguments split into the serializable payload and the callbacks.
pub(crate) struct ClassifiedArgs {
    pub(crate) values: Vec<Value>,
    pub(crate) completion: Option<Arc<dyn CompletionCallback>>,
    pub(crate) execution: Option<Arc<dyn ExecutionCallback>>,
}

/// Takes the first callback of each kind; every callback position becomes `null` in the
/// payload.
pub(crate) fn classify(args: Vec<Argument>) -> ClassifiedArgs {
    let mut classified = ClassifiedArgs {
        values: Vec::with_capacity(args.len()),
        completion: None,
        execution: None,
    };

    for (position, arg) in args.into_iter().enumerate() {
        match arg {
            Argument::Value(value) => classified.values.push(value),
            Argument::Completion(callback) => {
                if classified.completion.is_none() {
                    classified.completion = Some(callback);
                } else {
                    tracing::warn!(position, "ignoring additional completion callback argument");
                }
                classified.values.push(Value::Null);
            }
            Argument::Execution(callback) => {
                if classified.execution.is_none() {
                    classified.execution = Some(callback);
                } else {
                    tracing::warn!(position, "ignoring additional execution callback argument");
                }
                classified.values.push(Value::Null);
            }
        }
    }

    classified
}
