//! Experiment data model
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentConfig ──< SteadyStateMetric (N)
//!        │
//!        └─ run ─> ExperimentLog ──< ExperimentEvent (N) [append-only]
//!                        │
//!                        └─ archived in ExperimentHistory
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use chaos_harness::experiment::{ExperimentConfig, SteadyStateMetric};
//!
//! let config = ExperimentConfig::builder("pod-kill")
//!     .hypothesis("checkout keeps serving when one replica dies")
//!     .duration_seconds(60)
//!     .abort_threshold_seconds(10)
//!     .cooldown_seconds(30)
//!     .metric(SteadyStateMetric::new("success_rate", "sum(rate(ok[1m]))", ">=", 0.99))
//!     .build()?;
//!
//! assert!(config.validate().is_empty());
//! # Ok::<(), chaos_harness::Error>(())
//! ```

mod config;
mod history;
mod log;
mod state;

pub use config::{
    Comparator, ConfigWarning, ExperimentConfig, ExperimentConfigBuilder, SteadyStateMetric,
};
pub use history::ExperimentHistory;
pub use log::{EventKind, ExperimentEvent, ExperimentLog};
pub use state::ExperimentState;
