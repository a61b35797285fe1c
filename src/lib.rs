//! # chaos-harness: Steady-State Chaos Experiment Orchestration
//!
//! chaos-harness injects a controlled fault into a running system and
//! checks every second that the system's steady state holds. If a violation
//! lasts longer than a tolerated window, it stops the fault and aborts.
//! A process-wide circuit breaker bounds the blast radius and provides an
//! emergency stop that force-removes every active fault.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: Stop the line. A broken steady state beyond the abort
//!   threshold rolls the fault back automatically
//! - **Poka-Yoke safety**: Fail closed. Missing metrics, unknown comparators
//!   and empty assertion lists never read as healthy
//! - **Andon cord**: The emergency stop is a global kill switch independent
//!   of any single experiment
//! - **Genchi Genbutsu**: Every run returns an append-only, timestamped log
//!   of what actually happened
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chaos_harness::experiment::{ExperimentConfig, SteadyStateMetric};
//! use chaos_harness::guard::{BlastRadiusGuard, CircuitStore};
//! use chaos_harness::inject::{FaultRegistry, InjectionBackend};
//! use chaos_harness::kv::MemoryKvStore;
//! use chaos_harness::metrics::{MetricEvaluator, StaticMetricSource};
//! use chaos_harness::runner::ExperimentRunner;
//!
//! # async fn example(backend: Arc<dyn InjectionBackend>) -> chaos_harness::Result<()> {
//! let guard = BlastRadiusGuard::new(
//!     CircuitStore::new(MemoryKvStore::new()),
//!     Arc::new(FaultRegistry::new()),
//! );
//! let runner = ExperimentRunner::new(MetricEvaluator::new(StaticMetricSource::new()));
//!
//! let config = ExperimentConfig::builder("pod-kill")
//!     .duration_seconds(60)
//!     .abort_threshold_seconds(10)
//!     .metric(SteadyStateMetric::new("success_rate", "sum(rate(ok[1m]))", ">=", 0.99))
//!     .build()?;
//!
//! if guard.is_experiment_allowed("checkout", 0).await.allowed {
//!     let log = runner.run(&config, backend.as_ref()).await;
//!     println!("{}: {}", log.name(), log.final_state());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod engine;
pub mod error;
pub mod experiment;
pub mod guard;
pub mod inject;
pub mod kv;
pub mod metrics;
pub mod notify;
pub mod runner;
pub mod telemetry;

pub use engine::ChaosEngine;
pub use error::{Error, Result};
pub use experiment::{ExperimentConfig, ExperimentLog, ExperimentState};
pub use guard::BlastRadiusGuard;
pub use runner::ExperimentRunner;
