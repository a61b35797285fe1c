//! Blast-radius guard (circuit breaker)
//!
//! A global kill switch and admission controller shared by every runner.
//! The state lives in an injected [`KvStore`], not in a package-level
//! singleton, so tests and multi-process deployments can supply their own.
//!
//! ## Concurrency
//!
//! - Admission checks only read the store and never take a lock.
//! - Writes (emergency stop, reset, operator controls) are serialised by an
//!   async mutex so read-modify-write cycles do not lose updates.
//! - The store replaces the record atomically, so a reader sees either the
//!   previous or the new state, never a mix.
//!
//! `max_concurrent` is a **soft** limit: two callers that check admission
//! within the same instant can both be admitted before either starts
//! counting as running.
//!
//! An emergency stop is not delivered to in-flight runs. They keep their own
//! tick loop and stop their fault themselves, while the guard independently
//! force-stops every registered fault kind. Backends must tolerate both.

mod cleanup;
mod state;

pub use cleanup::{CleanupOutcome, CleanupReport};
pub use state::{
    CircuitState, CircuitStore, DEFAULT_STATE_KEY, REASON_ALLOWED, REASON_DISABLED,
    REASON_EMERGENCY_STOP,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::inject::FaultRegistry;
use crate::kv::KvStore;
use crate::Result;

/// Admission decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Whether the experiment may start.
    pub allowed: bool,
    /// Why; the first failing check when refused.
    pub reason: String,
}

impl Admission {
    /// An admitting decision.
    #[must_use]
    pub fn granted() -> Self {
        Self {
            allowed: true,
            reason: REASON_ALLOWED.to_string(),
        }
    }

    /// A refusing decision.
    #[must_use]
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Shared admission control and emergency stop.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use chaos_harness::guard::{BlastRadiusGuard, CircuitStore, REASON_EMERGENCY_STOP};
/// use chaos_harness::inject::FaultRegistry;
/// use chaos_harness::kv::MemoryKvStore;
///
/// # async fn example() {
/// let guard = BlastRadiusGuard::new(
///     CircuitStore::new(MemoryKvStore::new()),
///     Arc::new(FaultRegistry::new()),
/// );
///
/// assert!(guard.is_experiment_allowed("checkout", 0).await.allowed);
///
/// guard.trigger_emergency_stop("pager: checkout error budget burned").await;
/// let admission = guard.is_experiment_allowed("checkout", 0).await;
/// assert_eq!(admission.reason, REASON_EMERGENCY_STOP);
/// # }
/// ```
#[derive(Debug)]
pub struct BlastRadiusGuard<S> {
    store: CircuitStore<S>,
    registry: Arc<FaultRegistry>,
    write_lock: Mutex<()>,
}

impl<S: KvStore> BlastRadiusGuard<S> {
    /// Create a guard over a circuit store and the process's fault registry.
    #[must_use]
    pub fn new(store: CircuitStore<S>, registry: Arc<FaultRegistry>) -> Self {
        Self {
            store,
            registry,
            write_lock: Mutex::new(()),
        }
    }

    /// Fault kinds the emergency stop will clean up.
    #[must_use]
    pub const fn registry(&self) -> &Arc<FaultRegistry> {
        &self.registry
    }

    /// Current shared state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn state(&self) -> Result<CircuitState> {
        self.store.load().await
    }

    /// Decide whether an experiment targeting `target_scope` may start while
    /// `running` experiments are in flight.
    ///
    /// Fails closed if the state cannot be read.
    pub async fn is_experiment_allowed(&self, target_scope: &str, running: usize) -> Admission {
        let admission = match self.store.load().await {
            Ok(state) => state.evaluate(target_scope, running),
            Err(e) => {
                error!(error = %e, "circuit state unreadable; refusing experiment");
                Admission::denied(format!("Circuit state unavailable: {e}"))
            }
        };
        debug!(
            scope = target_scope,
            running,
            allowed = admission.allowed,
            reason = %admission.reason,
            "admission check"
        );
        admission
    }

    /// Latch the emergency stop and force-stop every registered fault kind.
    ///
    /// Always completes. A failure to persist the flag is reported in
    /// [`CleanupReport::state_error`] and cleanup still runs. Repeating the
    /// call on a clean system is harmless.
    pub async fn trigger_emergency_stop(&self, reason: &str) -> CleanupReport {
        warn!(reason, "emergency stop triggered");

        let state_error = match self
            .update(|state| {
                state.emergency_stop = true;
                state.emergency_stop_reason = Some(reason.to_string());
            })
            .await
        {
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "failed to persist emergency stop flag");
                Some(e.to_string())
            }
        };

        let outcomes = cleanup::stop_all(self.registry.backends()).await;
        let report = CleanupReport {
            reason: reason.to_string(),
            outcomes,
            state_error,
        };

        if report.is_clean() {
            info!(kinds = report.outcomes.len(), "emergency cleanup complete");
        } else {
            warn!(
                failed = report.failures().len(),
                kinds = report.outcomes.len(),
                "emergency cleanup finished with failures"
            );
        }
        report
    }

    /// Clear the emergency stop and its reason. Leaves `enabled` untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn reset_emergency_stop(&self) -> Result<()> {
        self.update(|state| {
            state.emergency_stop = false;
            state.emergency_stop_reason = None;
        })
        .await?;
        info!("emergency stop reset");
        Ok(())
    }

    /// Turn chaos on or off globally.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|state| state.enabled = enabled).await?;
        info!(enabled, "chaos master switch changed");
        Ok(())
    }

    /// Change the concurrency cap.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn set_max_concurrent(&self, max_concurrent: usize) -> Result<()> {
        self.update(|state| state.max_concurrent = max_concurrent)
            .await?;
        info!(max_concurrent, "concurrency cap changed");
        Ok(())
    }

    /// Add `scope` to the excluded scopes. No-op if already excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub async fn exclude_scope(&self, scope: &str) -> Result<()> {
        self.update(|state| {
            if !state.excluded_scopes.iter().any(|s| s == scope) {
                state.excluded_scopes.push(scope.to_string());
            }
        })
        .await?;
        info!(scope, "scope excluded from chaos");
        Ok(())
    }

    async fn update(&self, mutate: impl FnOnce(&mut CircuitState) + Send) -> Result<CircuitState> {
        let _guard = self.write_lock.lock().await;
        let mut state = self.store.load().await?;
        mutate(&mut state);
        self.store.save(&state).await?;
        Ok(state)
    }
}
