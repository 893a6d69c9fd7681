use crate::registry::{CancellationCoordinator, CorrelationRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing invocation traffic.
#[derive(Default, Debug)]
pub struct Telemetry {
    started: AtomicU64,
    finished: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    initiation_failures: AtomicU64,
    questions_asked: AtomicU64,
    questions_answered: AtomicU64,
    unanswered_questions: AtomicU64,
    dropped_progress: AtomicU64,
    leak_warnings: AtomicU64,
}

impl Telemetry {
    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_initiation_failure(&self) {
        self.initiation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_question_asked(&self) {
        self.questions_asked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_question_answered(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unanswered_question(&self) {
        self.unanswered_questions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_progress(&self) {
        self.dropped_progress.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_leak_warning(&self) {
        self.leak_warnings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            initiation_failures: self.initiation_failures.load(Ordering::Relaxed),
            questions_asked: self.questions_asked.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            unanswered_questions: self.unanswered_questions.load(Ordering::Relaxed),
            dropped_progress: self.dropped_progress.load(Ordering::Relaxed),
            leak_warnings: self.leak_warnings.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub started: u64,
    pub finished: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub initiation_failures: u64,
    pub questions_asked: u64,
    pub questions_answered: u64,
    pub unanswered_questions: u64,
    pub dropped_progress: u64,
    pub leak_warnings: u64,
}

/// Spawns a background task that periodically logs invocation throughput and registry sizes.
///
/// [`InvocationDispatcher::spawn_metrics_reporter`](crate::InvocationDispatcher::spawn_metrics_reporter)
/// wires this to a dispatcher's registries and the configured interval.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    coordinator: Arc<CancellationCoordinator>,
    correlations: Arc<CorrelationRegistry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "protocall::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let completed = (current.finished + current.failed)
                        .saturating_sub(last_snapshot.finished + last_snapshot.failed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed as f64 / elapsed
                    };

                    tracing::info!(
                        target: "protocall::metrics",
                        throughput = format!("{throughput:.2}"),
                        started = current.started,
                        finished = current.finished,
                        failed = current.failed,
                        timed_out = current.timed_out,
                        cancelled = current.cancelled,
                        tracked_invocations = coordinator.len(),
                        pending_questions = correlations.len(),
                        leak_warnings = current.leak_warnings,
                        "invocation metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
