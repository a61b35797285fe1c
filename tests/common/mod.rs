//! Shared test doubles for the integration suites.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chaos_harness::experiment::{ExperimentConfig, SteadyStateMetric};
use chaos_harness::inject::InjectionBackend;
use chaos_harness::metrics::{MetricEvaluator, MetricSource};
use chaos_harness::notify::Notifier;
use chaos_harness::runner::ExperimentRunner;
use chaos_harness::{Error, Result};

pub const PASS: Option<f64> = Some(1.0);
pub const FAIL: Option<f64> = Some(0.0);

/// Backend that counts calls and can be told to misbehave.
#[derive(Default)]
pub struct CountingBackend {
    kind: String,
    injects: AtomicUsize,
    stops: AtomicUsize,
    fail_inject: bool,
    fail_stop: bool,
    panic_on_stop: bool,
    active: Mutex<Vec<String>>,
}

impl CountingBackend {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    pub fn failing_inject(mut self) -> Self {
        self.fail_inject = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn panicking_stop(mut self) -> Self {
        self.panic_on_stop = true;
        self
    }

    pub fn with_active(self, instances: &[&str]) -> Self {
        *self.active.lock().unwrap() = instances.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn injects(&self) -> usize {
        self.injects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InjectionBackend for CountingBackend {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn inject(&self) -> Result<()> {
        let n = self.injects.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_inject {
            return Err(Error::Injection {
                kind: self.kind.clone(),
                reason: "admission webhook rejected the chaos resource".to_string(),
            });
        }
        self.active.lock().unwrap().push(format!("{}-{n}", self.kind));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_stop {
            panic!("backend crashed while stopping");
        }
        if self.fail_stop {
            return Err(Error::Injection {
                kind: self.kind.clone(),
                reason: "api server unreachable".to_string(),
            });
        }
        self.active.lock().unwrap().clear();
        Ok(())
    }

    async fn active_instances(&self) -> Result<Vec<String>> {
        Ok(self.active.lock().unwrap().clone())
    }
}

/// Metric source replaying a fixed sequence; the last value repeats.
pub struct ScriptedSource {
    script: Mutex<(VecDeque<Option<f64>>, Option<f64>)>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedSource {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self {
            script: Mutex::new((values.into(), None)),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Every query takes `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Pre-check, one value per tick, then post-check.
    pub fn run(pre: Option<f64>, ticks: &[Option<f64>], post: Option<f64>) -> Self {
        let mut values = vec![pre];
        values.extend_from_slice(ticks);
        values.push(post);
        Self::new(values)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricSource for ScriptedSource {
    async fn query(&self, _query: &str) -> Result<Option<f64>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let (queue, last) = &mut *script;
        if let Some(value) = queue.pop_front() {
            *last = value;
        }
        Ok(*last)
    }
}

/// Notifier whose delivery always fails.
pub struct BrokenNotifier {
    pub attempts: AtomicUsize,
}

impl Notifier for BrokenNotifier {
    fn notify(&self, _message: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(Error::Other("chat webhook returned 500".to_string()))
    }
}

pub fn health_metric() -> SteadyStateMetric {
    SteadyStateMetric::new("health", "up{job=\"checkout\"}", ">=", 1.0)
}

pub fn config(duration: u64, abort_threshold: u64) -> ExperimentConfig {
    ExperimentConfig::builder("checkout-pod-kill")
        .hypothesis("checkout stays healthy when one pod is killed")
        .duration_seconds(duration)
        .abort_threshold_seconds(abort_threshold)
        .metric(health_metric())
        .build()
        .unwrap()
}

pub fn runner(source: &Arc<ScriptedSource>) -> ExperimentRunner<Arc<ScriptedSource>> {
    ExperimentRunner::new(MetricEvaluator::new(Arc::clone(source)))
}
