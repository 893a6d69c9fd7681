use anyhow::{bail, Result};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_LEAK_THRESHOLD: usize = 1_000;
pub const DEFAULT_ANSWER: &str = "No";
const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_METRICS_INTERVAL_SECS: u64 = 5;

/// Runtime configuration shared by the dispatcher, the registries and the loopback transport.
///
/// All instances must be constructed via [`ProtocolConfig::builder`] or [`ProtocolConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    invocation_leak_threshold: usize,
    correlation_leak_threshold: usize,
    default_answer: Value,
    invocation_timeout: Duration,
    metrics_interval: Duration,
}

pub struct ProtocolConfigParams {
    pub invocation_leak_threshold: usize,
    pub correlation_leak_threshold: usize,
    pub default_answer: Value,
    pub invocation_timeout: Duration,
    pub metrics_interval: Duration,
}

impl ProtocolConfig {
    /// Returns a builder where every field falls back to its default.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values, running validation.
    pub fn new(params: ProtocolConfigParams) -> Result<Self> {
        let ProtocolConfigParams {
            invocation_leak_threshold,
            correlation_leak_threshold,
            default_answer,
            invocation_timeout,
            metrics_interval,
        } = params;

        let config = Self {
            invocation_leak_threshold,
            correlation_leak_threshold,
            default_answer,
            invocation_timeout,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Tracked invocations above which the cancellation coordinator warns about a leak.
    pub fn invocation_leak_threshold(&self) -> usize {
        self.invocation_leak_threshold
    }

    /// Pending questions above which the correlation registry warns about a leak.
    pub fn correlation_leak_threshold(&self) -> usize {
        self.correlation_leak_threshold
    }

    /// Answer used when a question reaches a caller that cannot answer it.
    pub fn default_answer(&self) -> &Value {
        &self.default_answer
    }

    /// Upper bound after which the loopback transport reports a timeout.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn validate(&self) -> Result<()> {
        if self.invocation_leak_threshold == 0 {
            bail!("invocation_leak_threshold must be greater than 0");
        }

        if self.correlation_leak_threshold == 0 {
            bail!("correlation_leak_threshold must be greater than 0");
        }

        if self.default_answer.is_null() {
            bail!("default_answer cannot be null");
        }

        if self.invocation_timeout.is_zero() {
            bail!("invocation_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            invocation_leak_threshold: DEFAULT_LEAK_THRESHOLD,
            correlation_leak_threshold: DEFAULT_LEAK_THRESHOLD,
            default_answer: Value::String(DEFAULT_ANSWER.to_owned()),
            invocation_timeout: Duration::from_secs(DEFAULT_INVOCATION_TIMEOUT_SECS),
            metrics_interval: Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProtocolConfigBuilder {
    invocation_leak_threshold: Option<usize>,
    correlation_leak_threshold: Option<usize>,
    default_answer: Option<Value>,
    invocation_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl ProtocolConfigBuilder {
    pub fn invocation_leak_threshold(mut self, threshold: usize) -> Self {
        self.invocation_leak_threshold = Some(threshold);
        self
    }

    pub fn correlation_leak_threshold(mut self, threshold: usize) -> Self {
        self.correlation_leak_threshold = Some(threshold);
        self
    }

    pub fn default_answer(mut self, answer: impl Into<Value>) -> Self {
        self.default_answer = Some(answer.into());
        self
    }

    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<ProtocolConfig> {
        let defaults = ProtocolConfig::default();
        let params = ProtocolConfigParams {
            invocation_leak_threshold: self
                .invocation_leak_threshold
                .unwrap_or(defaults.invocation_leak_threshold),
            correlation_leak_threshold: self
                .correlation_leak_threshold
                .unwrap_or(defaults.correlation_leak_threshold),
            default_answer: self.default_answer.unwrap_or(defaults.default_answer),
            invocation_timeout: self
                .invocation_timeout
                .unwrap_or(defaults.invocation_timeout),
            metrics_interval: self.metrics_interval.unwrap_or(defaults.metrics_interval),
        };

        ProtocolConfig::new(params)
    }
}
