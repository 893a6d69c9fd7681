use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use protocall::{Argument, ProtocolConfig};
use tokio::task::spawn_blocking;
use tokio::time::sleep;

use crate::support::callbacks::{Outcome, RecordingCompletion, RecordingExecution};
use crate::support::files::Harness;

fn impatient() -> Result<Harness> {
    let config = ProtocolConfig::builder()
        .invocation_timeout(Duration::from_millis(100))
        .build()?;
    Ok(Harness::with_config(config))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_operation_times_out_and_is_cancelled() -> Result<()> {
    let harness = impatient()?;
    let completion = Arc::new(RecordingCompletion::default());
    let execution = Arc::new(RecordingExecution::default());

    harness.proxy().call(
        "hang",
        vec![
            Argument::execution(execution),
            Argument::completion(completion.clone()),
        ],
    )?;

    assert_eq!(completion.first_outcome().await, Outcome::TimedOut);
    harness.until_stopped(1).await;
    harness.settled().await;
    sleep(Duration::from_millis(20)).await;

    assert_eq!(completion.outcomes(), vec![Outcome::TimedOut]);
    let snapshot = harness.dispatcher.telemetry().snapshot();
    assert_eq!(snapshot.timed_out, 1);
    assert_eq!(snapshot.cancelled, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_call_times_out() -> Result<()> {
    let harness = impatient()?;
    let client = harness.client();

    let err = spawn_blocking(move || client.hang()).await?.unwrap_err();
    assert!(err.is_timeout());
    harness.until_stopped(1).await;
    harness.settled().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quick_operation_beats_the_timer() -> Result<()> {
    let harness = impatient()?;
    let client = harness.client();

    let size = spawn_blocking(move || client.size("z")).await??;
    assert_eq!(size, 100);
    sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.dispatcher.telemetry().snapshot().timed_out, 0);
    Ok(())
}
