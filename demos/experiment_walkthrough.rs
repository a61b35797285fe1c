//! Experiment Walkthrough: Steady-State Chaos with a Blast-Radius Guard
//!
//! This demo runs three experiments against an in-memory metrics source
//! and a fault backend that only logs:
//! - a healthy run that completes
//! - a run whose steady state breaks and is aborted
//! - an emergency stop while a run is in flight
//!
//! Ticks are shortened to 200ms so the whole walkthrough takes a few seconds.
//!
//! Run with: cargo run --example experiment_walkthrough

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chaos_harness::experiment::{EventKind, ExperimentConfig, SteadyStateMetric};
use chaos_harness::guard::{BlastRadiusGuard, CircuitStore};
use chaos_harness::inject::{FaultRegistry, InjectionBackend};
use chaos_harness::kv::MemoryKvStore;
use chaos_harness::metrics::{MetricEvaluator, StaticMetricSource};
use chaos_harness::runner::{ExperimentRunner, RunnerSettings};
use chaos_harness::{telemetry, ChaosEngine, Error};

const SUCCESS_RATE: &str = "sum(rate(http_requests_ok[1m])) / sum(rate(http_requests[1m]))";

/// Fault backend that pretends to kill pods.
struct PodKiller {
    killed: AtomicUsize,
}

#[async_trait]
impl InjectionBackend for PodKiller {
    fn kind(&self) -> &str {
        "pod-chaos"
    }

    async fn inject(&self) -> chaos_harness::Result<()> {
        let n = self.killed.fetch_add(1, Ordering::SeqCst) + 1;
        println!("    [backend] killing checkout pod #{n}");
        Ok(())
    }

    async fn stop(&self) -> chaos_harness::Result<()> {
        println!("    [backend] restoring checkout pods");
        Ok(())
    }

    async fn active_instances(&self) -> chaos_harness::Result<Vec<String>> {
        Ok(vec![format!("checkout-kill-{}", self.killed.load(Ordering::SeqCst))])
    }
}

fn experiment(name: &str, duration: u64) -> chaos_harness::Result<ExperimentConfig> {
    ExperimentConfig::builder(name)
        .hypothesis("checkout success rate stays above 99% when one pod dies")
        .duration_seconds(duration)
        .abort_threshold_seconds(2)
        .metric(SteadyStateMetric::new("success_rate", SUCCESS_RATE, ">=", 0.99))
        .build()
}

#[tokio::main]
async fn main() -> chaos_harness::Result<()> {
    telemetry::init();
    println!("=== chaos-harness Experiment Walkthrough ===\n");

    let metrics = Arc::new(StaticMetricSource::new());
    metrics.set(SUCCESS_RATE, 0.999);

    let guard = Arc::new(BlastRadiusGuard::new(
        CircuitStore::new(MemoryKvStore::new()),
        Arc::new(FaultRegistry::new()),
    ));
    let runner = Arc::new(
        ExperimentRunner::new(MetricEvaluator::new(Arc::clone(&metrics))).with_settings(
            RunnerSettings {
                tick: Duration::from_millis(200),
            },
        ),
    );
    let engine = ChaosEngine::new(Arc::clone(&guard), runner);
    let backend = Arc::new(PodKiller {
        killed: AtomicUsize::new(0),
    });

    println!("=== Run 1: Healthy System ===");
    let log = engine
        .launch("checkout", experiment("pod-kill-healthy", 5)?, backend.clone())
        .await?
        .await
        .map_err(|e| Error::Other(e.to_string()))?;
    println!(
        "  Final state: {} ({} checks)\n",
        log.final_state(),
        log.count(EventKind::MetricCheck)
    );

    println!("=== Run 2: Steady State Breaks ===");
    let handle = engine
        .launch("checkout", experiment("pod-kill-degraded", 10)?, backend.clone())
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("  Success rate drops to 90%");
    metrics.set(SUCCESS_RATE, 0.90);
    let log = handle.await.map_err(|e| Error::Other(e.to_string()))?;
    if let Some(abort) = log.events_of(EventKind::Abort).next() {
        println!("  Abort payload: {}", abort.payload());
    }
    println!("  Final state: {}\n", log.final_state());
    metrics.set(SUCCESS_RATE, 0.999);

    println!("=== Run 3: Emergency Stop ===");
    let handle = engine
        .launch("checkout", experiment("pod-kill-estop", 20)?, backend.clone())
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let report = guard.trigger_emergency_stop("on-call pressed the button").await;
    for outcome in &report.outcomes {
        println!(
            "  Cleaned {}: {:?} (error: {:?})",
            outcome.kind, outcome.active_instances, outcome.error
        );
    }
    match engine
        .launch("checkout", experiment("pod-kill-late", 5)?, backend.clone())
        .await
    {
        Err(e) => println!("  New launch refused: {e}"),
        Ok(_) => println!("  New launch unexpectedly admitted"),
    }
    engine.shutdown();
    let log = handle.await.map_err(|e| Error::Other(e.to_string()))?;
    println!("  In-flight run ended: {}\n", log.final_state());

    guard.reset_emergency_stop().await?;
    println!("Emergency stop reset; history holds {} runs", engine.with_history(|h| h.len()));
    Ok(())
}
