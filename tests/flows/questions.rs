use std::sync::Arc;

use anyhow::Result;
use protocall::{Argument, ProtocolConfig};
use serde_json::json;

use crate::support::callbacks::{Outcome, RecordingCompletion, RecordingExecution};
use crate::support::files::Harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn execution_callback_answers_questions() -> Result<()> {
    let harness = Harness::new();
    let completion = Arc::new(RecordingCompletion::default());
    let execution = Arc::new(RecordingExecution::answering(json!("Yes")));

    harness.proxy().call(
        "overwrite",
        vec![
            Argument::value("a.txt"),
            Argument::execution(execution),
            Argument::completion(completion.clone()),
        ],
    )?;

    assert_eq!(completion.first_outcome().await, Outcome::Finished(json!("Yes")));
    assert!(completion.warnings().is_empty());
    harness.settled().await;

    let snapshot = harness.dispatcher.telemetry().snapshot();
    assert_eq!(snapshot.questions_asked, 1);
    assert_eq!(snapshot.questions_answered, 1);
    assert_eq!(snapshot.unanswered_questions, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unanswerable_question_gets_default_and_warning() -> Result<()> {
    let harness = Harness::new();
    let completion = Arc::new(RecordingCompletion::default());

    harness.proxy().call(
        "overwrite",
        vec![
            Argument::value("b.txt"),
            Argument::completion(completion.clone()),
        ],
    )?;

    assert_eq!(completion.first_outcome().await, Outcome::Finished(json!("No")));
    let warnings = completion.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("overwrite b.txt?"));
    harness.settled().await;
    assert_eq!(
        harness.dispatcher.telemetry().snapshot().unanswered_questions,
        1
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_answer_is_configurable() -> Result<()> {
    let config = ProtocolConfig::builder().default_answer("Skip").build()?;
    let harness = Harness::with_config(config);
    let completion = Arc::new(RecordingCompletion::default());
    let silent = Arc::new(RecordingExecution::default());

    harness.proxy().call(
        "overwrite",
        vec![
            Argument::value("c.txt"),
            Argument::execution(silent),
            Argument::completion(completion.clone()),
        ],
    )?;

    assert_eq!(completion.first_outcome().await, Outcome::Finished(json!("Skip")));
    assert_eq!(completion.warnings().len(), 1);
    harness.settled().await;
    Ok(())
}
