use std::sync::Mutex;
use std::time::Duration;

use protocall::{
    CompletionCallback, ExecutionCallback, InvocationError, InvocationHandle, ProgressMonitor,
};
use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::timeout;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished(Value),
    Failed(String),
    Cancelled,
    TimedOut,
}

/// Completion callback that records every delivery so tests can assert there was exactly one.
#[derive(Default)]
pub struct RecordingCompletion {
    outcomes: Mutex<Vec<Outcome>>,
    warnings: Mutex<Vec<String>>,
    notify: Notify,
}

impl RecordingCompletion {
    fn push(&self, outcome: Outcome) {
        self.outcomes.lock().unwrap().push(outcome);
        self.notify.notify_waiters();
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub async fn first_outcome(&self) -> Outcome {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if let Some(outcome) = self.outcomes.lock().unwrap().first().cloned() {
                    return outcome;
                }
                notified.await;
            }
        };
        timeout(WAIT_LIMIT, wait)
            .await
            .expect("no outcome delivered in time")
    }
}

impl CompletionCallback for RecordingCompletion {
    fn finished(&self, value: Value) {
        self.push(Outcome::Finished(value));
    }

    fn failed(&self, error: InvocationError) {
        if error.is_cancelled() {
            self.push(Outcome::Cancelled);
        } else {
            self.push(Outcome::Failed(error.to_string()));
        }
    }

    fn timed_out(&self) {
        self.push(Outcome::TimedOut);
    }

    fn warning(&self, warning: InvocationError) {
        self.warnings.lock().unwrap().push(warning.to_string());
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Description(Option<String>),
    TotalSteps(Option<u64>),
    Worked(u64),
    Done,
}

/// Execution callback recording progress, optionally answering questions, and keeping the
/// cancel handle it was given.
#[derive(Default)]
pub struct RecordingExecution {
    events: Mutex<Vec<ProgressEvent>>,
    answer: Option<Value>,
    handle: Mutex<Option<InvocationHandle>>,
}

impl RecordingExecution {
    pub fn answering(answer: Value) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn total_worked(&self) -> u64 {
        self.events()
            .iter()
            .map(|event| match event {
                ProgressEvent::Worked(delta) => *delta,
                _ => 0,
            })
            .sum()
    }

    pub fn handle(&self) -> InvocationHandle {
        self.handle
            .lock()
            .unwrap()
            .clone()
            .expect("handle attached before submit")
    }
}

impl ProgressMonitor for RecordingExecution {
    fn set_description(&self, description: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::Description(description.map(str::to_owned)));
    }

    fn set_total_steps(&self, total_steps: Option<u64>) {
        self.events
            .lock()
            .unwrap()
            .push(ProgressEvent::TotalSteps(total_steps));
    }

    fn worked(&self, delta: u64) {
        self.events.lock().unwrap().push(ProgressEvent::Worked(delta));
    }

    fn done(&self) {
        self.events.lock().unwrap().push(ProgressEvent::Done);
    }
}

impl ExecutionCallback for RecordingExecution {
    fn answer(&self, _question: &Value) -> Option<Value> {
        self.answer.clone()
    }

    fn attach(&self, handle: InvocationHandle) {
        *self.handle.lock().unwrap() = Some(handle);
    }
}
