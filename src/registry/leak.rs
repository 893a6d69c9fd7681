//! Size-threshold diagnostics for the shared registries.
//!
//! A registry that keeps growing means some invocation or question was registered and never
//! released. The detector reports each upward crossing of the threshold once and re-arms when
//! the size falls back to or below it.

use crate::runtime::telemetry::Telemetry;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Details passed to a custom leak sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeakWarning {
    pub registry: &'static str,
    pub size: usize,
    pub threshold: usize,
}

type LeakSink = Arc<dyn Fn(&LeakWarning) + Send + Sync>;

pub struct LeakDetector {
    registry: &'static str,
    threshold: usize,
    above: AtomicBool,
    warnings: AtomicU64,
    telemetry: Option<Arc<Telemetry>>,
    sink: Option<LeakSink>,
}

impl LeakDetector {
    pub fn new(registry: &'static str, threshold: usize) -> Self {
        Self {
            registry,
            threshold: threshold.max(1),
            above: AtomicBool::new(false),
            warnings: AtomicU64::new(0),
            telemetry: None,
            sink: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Routes warnings to `sink` in addition to the `tracing` output.
    pub fn with_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&LeakWarning) + Send + Sync + 'static,
    {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Number of warnings emitted so far.
    pub fn warnings(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    /// Records the current registry size. Returns `true` when this call emitted a warning.
    pub(crate) fn observe(&self, size: usize) -> bool {
        if size <= self.threshold {
            self.above.store(false, Ordering::Relaxed);
            return false;
        }

        if self.above.swap(true, Ordering::Relaxed) {
            return false;
        }

        let warning = LeakWarning {
            registry: self.registry,
            size,
            threshold: self.threshold,
        };
        tracing::warn!(
            registry = warning.registry,
            size = warning.size,
            threshold = warning.threshold,
            "registry size exceeded threshold; entries are probably never released"
        );
        self.warnings.fetch_add(1, Ordering::Relaxed);
        if let Some(telemetry) = &self.telemetry {
            telemetry.record_leak_warning();
        }
        if let Some(sink) = &self.sink {
            sink(&warning);
        }
        true
    }
}

impl fmt::Debug for LeakDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakDetector")
            .field("registry", &self.registry)
            .field("threshold", &self.threshold)
            .field("warnings", &self.warnings())
            .finish()
    }
}
