//! Experiment configuration - steady-state assertions and timing

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Comparison applied as `value <comparator> threshold`.
///
/// Serialized as its symbol. Unknown symbols are kept as
/// [`Comparator::Unrecognized`] rather than rejected, so a misconfigured
/// metric fails closed at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparator {
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
    /// `==`
    Equal,
    /// Any other symbol; never passes.
    Unrecognized(String),
}

impl Comparator {
    /// The comparator's symbol as written in configuration.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::GreaterOrEqual => ">=",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::Less => "<",
            Self::Equal => "==",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// Whether this is one of the five supported comparators.
    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }

    /// Apply the comparison.
    ///
    /// Returns `None` for an unrecognized comparator. Any comparison
    /// involving NaN is `false`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn evaluate(&self, value: f64, threshold: f64) -> Option<bool> {
        match self {
            Self::GreaterOrEqual => Some(value >= threshold),
            Self::LessOrEqual => Some(value <= threshold),
            Self::Greater => Some(value > threshold),
            Self::Less => Some(value < threshold),
            Self::Equal => Some(value == threshold),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<&str> for Comparator {
    fn from(symbol: &str) -> Self {
        match symbol.trim() {
            ">=" => Self::GreaterOrEqual,
            "<=" => Self::LessOrEqual,
            ">" => Self::Greater,
            "<" => Self::Less,
            "==" => Self::Equal,
            other => Self::Unrecognized(other.to_string()),
        }
    }
}

impl From<String> for Comparator {
    fn from(symbol: String) -> Self {
        Self::from(symbol.as_str())
    }
}

impl From<Comparator> for String {
    fn from(comparator: Comparator) -> Self {
        comparator.symbol().to_string()
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A named assertion against an external metric source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateMetric {
    name: String,
    query: String,
    threshold: f64,
    comparator: Comparator,
}

impl SteadyStateMetric {
    /// Create a steady-state assertion.
    ///
    /// # Arguments
    ///
    /// * `name` - Key under which the result is reported
    /// * `query` - Backend-specific query string
    /// * `comparator` - Comparison symbol or [`Comparator`]
    /// * `threshold` - Right-hand side of the comparison
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        comparator: impl Into<Comparator>,
        threshold: f64,
    ) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            threshold,
            comparator: comparator.into(),
        }
    }

    /// Metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query sent to the metrics backend.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Threshold value.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Comparator.
    #[must_use]
    pub const fn comparator(&self) -> &Comparator {
        &self.comparator
    }
}

/// Non-fatal configuration findings reported by [`ExperimentConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `abort_threshold_seconds >= duration_seconds`: abort cannot fire
    /// before the experiment ends on its own.
    AbortThresholdNotBelowDuration {
        /// Configured abort threshold
        abort_threshold_seconds: u64,
        /// Configured duration
        duration_seconds: u64,
    },
    /// No steady-state metrics; every check fails closed.
    NoSteadyStateMetrics,
    /// Metric uses an unknown comparator and will never pass.
    UnrecognizedComparator {
        /// Metric name
        metric: String,
        /// Raw comparator text
        comparator: String,
    },
    /// Two metrics share a name; only the last result is kept per name.
    DuplicateMetricName(String),
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbortThresholdNotBelowDuration {
                abort_threshold_seconds,
                duration_seconds,
            } => write!(
                f,
                "abort threshold ({abort_threshold_seconds}s) is not below duration ({duration_seconds}s); abort can never fire"
            ),
            Self::NoSteadyStateMetrics => {
                f.write_str("no steady-state metrics configured; every check will fail")
            }
            Self::UnrecognizedComparator { metric, comparator } => write!(
                f,
                "metric '{metric}' uses unrecognized comparator '{comparator}'; it will never pass"
            ),
            Self::DuplicateMetricName(name) => {
                write!(f, "metric name '{name}' is used more than once")
            }
        }
    }
}

/// Configuration for one experiment run.
///
/// Created once per run and discarded after. Build with
/// [`ExperimentConfig::builder`] or load from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    name: String,
    #[serde(default)]
    hypothesis: String,
    duration_seconds: u64,
    steady_state_metrics: Vec<SteadyStateMetric>,
    #[serde(deserialize_with = "seconds_at_least_zero")]
    abort_threshold_seconds: u64,
    #[serde(default)]
    cooldown_seconds: u64,
}

/// Accepts negative seconds and clamps them to zero, which means
/// "abort on the first failing tick".
fn seconds_at_least_zero<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(u64),
        Negative(i64),
    }

    Ok(match Seconds::deserialize(deserializer)? {
        Seconds::Whole(seconds) => seconds,
        Seconds::Negative(seconds) => u64::try_from(seconds).unwrap_or(0),
    })
}

impl ExperimentConfig {
    /// Create a builder for an experiment with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::new(name)
    }

    /// Parse a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed JSON and `InvalidConfig` for an
    /// empty name.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.check_name()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as [`Self::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    fn check_name(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "experiment name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hypothesis under test.
    #[must_use]
    pub fn hypothesis(&self) -> &str {
        &self.hypothesis
    }

    /// Number of monitoring ticks.
    #[must_use]
    pub const fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Steady-state assertions checked before, during and after injection.
    #[must_use]
    pub fn steady_state_metrics(&self) -> &[SteadyStateMetric] {
        &self.steady_state_metrics
    }

    /// Longest tolerated continuous violation.
    #[must_use]
    pub const fn abort_threshold_seconds(&self) -> u64 {
        self.abort_threshold_seconds
    }

    /// Settle time between stopping the fault and the post-check.
    #[must_use]
    pub const fn cooldown_seconds(&self) -> u64 {
        self.cooldown_seconds
    }

    /// Report configuration problems that do not prevent a run.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.abort_threshold_seconds >= self.duration_seconds {
            warnings.push(ConfigWarning::AbortThresholdNotBelowDuration {
                abort_threshold_seconds: self.abort_threshold_seconds,
                duration_seconds: self.duration_seconds,
            });
        }

        if self.steady_state_metrics.is_empty() {
            warnings.push(ConfigWarning::NoSteadyStateMetrics);
        }

        let mut seen = HashSet::new();
        for metric in &self.steady_state_metrics {
            if !metric.comparator.is_recognized() {
                warnings.push(ConfigWarning::UnrecognizedComparator {
                    metric: metric.name.clone(),
                    comparator: metric.comparator.symbol().to_string(),
                });
            }
            if !seen.insert(metric.name.as_str()) {
                warnings.push(ConfigWarning::DuplicateMetricName(metric.name.clone()));
            }
        }

        warnings
    }
}

/// Builder for `ExperimentConfig`.
#[derive(Debug)]
pub struct ExperimentConfigBuilder {
    config: ExperimentConfig,
}

impl ExperimentConfigBuilder {
    /// Create a new builder; all durations start at zero.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: ExperimentConfig {
                name: name.into(),
                hypothesis: String::new(),
                duration_seconds: 0,
                steady_state_metrics: Vec::new(),
                abort_threshold_seconds: 0,
                cooldown_seconds: 0,
            },
        }
    }

    /// Set the hypothesis text.
    #[must_use]
    pub fn hypothesis(mut self, hypothesis: impl Into<String>) -> Self {
        self.config.hypothesis = hypothesis.into();
        self
    }

    /// Set the number of one-second monitoring ticks.
    #[must_use]
    pub const fn duration_seconds(mut self, seconds: u64) -> Self {
        self.config.duration_seconds = seconds;
        self
    }

    /// Set the abort threshold.
    #[must_use]
    pub const fn abort_threshold_seconds(mut self, seconds: u64) -> Self {
        self.config.abort_threshold_seconds = seconds;
        self
    }

    /// Set the cooldown before the post-check.
    #[must_use]
    pub const fn cooldown_seconds(mut self, seconds: u64) -> Self {
        self.config.cooldown_seconds = seconds;
        self
    }

    /// Add a steady-state metric.
    #[must_use]
    pub fn metric(mut self, metric: SteadyStateMetric) -> Self {
        self.config.steady_state_metrics.push(metric);
        self
    }

    /// Build the `ExperimentConfig`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the name is empty.
    pub fn build(self) -> Result<ExperimentConfig> {
        self.config.check_name()?;
        Ok(self.config)
    }
}
