//! Steady-state evaluation against an external metrics backend
//!
//! The engine depends only on [`MetricSource`]: one capability, "run this
//! query string and give me a number if there is one". Adapters for a
//! concrete time-series backend live outside this crate;
//! [`StaticMetricSource`] is the in-memory adapter.
//!
//! Evaluation fails closed. Missing data, a failed or timed-out query, an
//! unknown comparator and an empty metric list all count as "not passing".
//! A metrics outage therefore reads as degradation and can never hide a
//! real one.

mod static_source;

pub use static_source::StaticMetricSource;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::experiment::SteadyStateMetric;
use crate::Result;

/// Default bound on a single metric query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// External metrics collaborator.
///
/// `Ok(None)` means the query matched no data point. Both `Ok(None)` and
/// `Err(_)` are treated as missing data by the evaluator.
pub trait MetricSource: Send + Sync {
    /// Execute `query` and return its current scalar value, if any.
    fn query(&self, query: &str) -> impl Future<Output = Result<Option<f64>>> + Send;
}

impl<M: MetricSource> MetricSource for Arc<M> {
    fn query(&self, query: &str) -> impl Future<Output = Result<Option<f64>>> + Send {
        (**self).query(query)
    }
}

/// Outcome for one steady-state metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// Observed value; `None` when the backend returned no data or failed.
    pub value: Option<f64>,
    /// Whether the assertion held.
    pub pass: bool,
}

/// Outcome of one steady-state check across all configured metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateReport {
    /// Logical AND of every metric's `pass`; `false` for an empty list.
    pub all_pass: bool,
    /// Per-metric outcome keyed by metric name.
    pub results: BTreeMap<String, MetricResult>,
    /// Configuration problem that forced a failing result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

impl SteadyStateReport {
    /// Outcome for one metric by name.
    #[must_use]
    pub fn result(&self, name: &str) -> Option<&MetricResult> {
        self.results.get(name)
    }

    /// Names of the metrics that did not pass.
    #[must_use]
    pub fn failing(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, result)| !result.pass)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Runs steady-state assertions against a [`MetricSource`].
///
/// # Example
///
/// ```rust
/// use chaos_harness::experiment::SteadyStateMetric;
/// use chaos_harness::metrics::{MetricEvaluator, StaticMetricSource};
///
/// # async fn example() {
/// let source = StaticMetricSource::new();
/// source.set("up{job=\"api\"}", 1.0);
///
/// let evaluator = MetricEvaluator::new(source);
/// let report = evaluator
///     .check_steady_state(&[SteadyStateMetric::new("api_up", "up{job=\"api\"}", "==", 1.0)])
///     .await;
/// assert!(report.all_pass);
/// # }
/// ```
#[derive(Debug)]
pub struct MetricEvaluator<M> {
    source: M,
    query_timeout: Duration,
}

impl<M: MetricSource> MetricEvaluator<M> {
    /// Create an evaluator with the default query timeout.
    #[must_use]
    pub const fn new(source: M) -> Self {
        Self {
            source,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Bound each query; a timed-out query counts as missing data.
    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The underlying metrics collaborator.
    #[must_use]
    pub const fn source(&self) -> &M {
        &self.source
    }

    /// Evaluate every metric and AND the results.
    ///
    /// Never fails: collaborator errors become failing results.
    pub async fn check_steady_state(&self, metrics: &[SteadyStateMetric]) -> SteadyStateReport {
        if metrics.is_empty() {
            warn!("steady-state check requested with no metrics; failing closed");
            return SteadyStateReport {
                all_pass: false,
                results: BTreeMap::new(),
                issue: Some("no steady-state metrics configured".to_string()),
            };
        }

        let mut all_pass = true;
        let mut results = BTreeMap::new();
        for metric in metrics {
            let result = self.evaluate(metric).await;
            all_pass &= result.pass;
            results.insert(metric.name().to_string(), result);
        }

        SteadyStateReport {
            all_pass,
            results,
            issue: None,
        }
    }

    async fn evaluate(&self, metric: &SteadyStateMetric) -> MetricResult {
        let value = match tokio::time::timeout(
            self.query_timeout,
            self.source.query(metric.query()),
        )
        .await
        {
            Ok(Ok(Some(value))) => Some(value),
            Ok(Ok(None)) => {
                debug!(metric = metric.name(), query = metric.query(), "no data point");
                None
            }
            Ok(Err(e)) => {
                warn!(metric = metric.name(), error = %e, "metric query failed; treating as missing data");
                None
            }
            Err(_) => {
                warn!(
                    metric = metric.name(),
                    timeout_ms = u64::try_from(self.query_timeout.as_millis()).unwrap_or(u64::MAX),
                    "metric query timed out; treating as missing data"
                );
                None
            }
        };

        let pass = value.is_some_and(|v| {
            metric
                .comparator()
                .evaluate(v, metric.threshold())
                .unwrap_or_else(|| {
                    warn!(
                        metric = metric.name(),
                        comparator = %metric.comparator(),
                        "unrecognized comparator; failing closed"
                    );
                    false
                })
        });

        MetricResult { value, pass }
    }
}
