//! In-memory metric source.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::MetricSource;
use crate::{Error, Result};

/// [`MetricSource`] answering queries from an in-memory table.
///
/// Query strings are matched verbatim. Values can be changed while an
/// experiment is running, and the whole source can be marked unavailable
/// to simulate a metrics outage.
#[derive(Debug, Default)]
pub struct StaticMetricSource {
    values: DashMap<String, f64, FxBuildHasher>,
    unavailable: AtomicBool,
}

impl StaticMetricSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value returned for `query`.
    pub fn set(&self, query: impl Into<String>, value: f64) {
        self.values.insert(query.into(), value);
    }

    /// Remove `query`; later queries return no data.
    pub fn remove(&self, query: &str) {
        self.values.remove(query);
    }

    /// Number of queries with a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no query has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Make every query fail until set back to `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }
}

impl MetricSource for StaticMetricSource {
    async fn query(&self, query: &str) -> Result<Option<f64>> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(Error::MetricQuery {
                query: query.to_string(),
                reason: "metrics backend unavailable".to_string(),
            });
        }
        Ok(self.values.get(query).map(|v| *v.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_query_remove() {
        let source = StaticMetricSource::new();
        assert!(source.is_empty());

        source.set("up", 1.0);
        assert_eq!(source.query("up").await.unwrap(), Some(1.0));
        assert_eq!(source.len(), 1);

        source.remove("up");
        assert_eq!(source.query("up").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let source = StaticMetricSource::new();
        source.set("up", 1.0);

        source.set_unavailable(true);
        let err = source.query("up").await.unwrap_err();
        assert!(err.to_string().contains("metrics backend unavailable"));

        source.set_unavailable(false);
        assert_eq!(source.query("up").await.unwrap(), Some(1.0));
    }
}
