use std::sync::Arc;

use anyhow::Result;
use protocall::InvocationError;
use tokio::task::spawn_blocking;

use crate::support::callbacks::{ProgressEvent, RecordingExecution};
use crate::support::files::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_call_returns_the_value() -> Result<()> {
    let harness = Harness::new();
    let client = harness.client();

    let size = spawn_blocking(move || client.size("notes.md")).await??;
    assert_eq!(size, 800);
    harness.settled().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_call_still_reports_progress() -> Result<()> {
    let harness = Harness::new();
    let client = harness.client();
    let execution = Arc::new(RecordingExecution::default());
    let monitor = execution.clone();

    let copied = spawn_blocking(move || client.copy(3, monitor)).await??;
    assert_eq!(copied, 3);
    assert_eq!(execution.total_worked(), 3);
    assert_eq!(execution.events().last(), Some(&ProgressEvent::Done));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_failure_is_wrapped_once() -> Result<()> {
    let harness = Harness::new();
    let client = harness.client();

    let err = spawn_blocking(move || client.fail()).await?.unwrap_err();
    assert!(matches!(err, InvocationError::Remote(_)));
    assert!(matches!(err.root(), InvocationError::Operation(_)));
    assert!(err.to_string().contains("disk full"));
    harness.settled().await;
    Ok(())
}
