//! Chaos engine - admission, scheduling and bookkeeping for many runs
//!
//! Each admitted experiment runs as its own tokio task. Runs share nothing
//! with each other except the blast-radius guard.
//!
//! The running count used for admission is read before the new run is
//! counted, so two launches racing each other can both be admitted and
//! exceed `max_concurrent` by one. This is a documented soft limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::experiment::{ExperimentConfig, ExperimentHistory, ExperimentLog};
use crate::guard::BlastRadiusGuard;
use crate::inject::InjectionBackend;
use crate::kv::KvStore;
use crate::metrics::MetricSource;
use crate::runner::ExperimentRunner;
use crate::{Error, Result};

/// Reason returned by [`ChaosEngine::launch`] after shutdown.
pub const REASON_SHUTTING_DOWN: &str = "Chaos engine is shutting down";

/// Decrements the running count when a run task ends, even by panic.
struct RunningSlot(Arc<AtomicUsize>);

impl RunningSlot {
    fn acquire(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Front door for launching experiments.
pub struct ChaosEngine<M, S> {
    guard: Arc<BlastRadiusGuard<S>>,
    runner: Arc<ExperimentRunner<M>>,
    running: Arc<AtomicUsize>,
    history: Arc<Mutex<ExperimentHistory>>,
    shutdown: CancellationToken,
}

impl<M, S> ChaosEngine<M, S>
where
    M: MetricSource + 'static,
    S: KvStore + 'static,
{
    /// Create an engine from a shared guard and runner.
    #[must_use]
    pub fn new(guard: Arc<BlastRadiusGuard<S>>, runner: Arc<ExperimentRunner<M>>) -> Self {
        Self {
            guard,
            runner,
            running: Arc::new(AtomicUsize::new(0)),
            history: Arc::new(Mutex::new(ExperimentHistory::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// The shared blast-radius guard.
    #[must_use]
    pub const fn guard(&self) -> &Arc<BlastRadiusGuard<S>> {
        &self.guard
    }

    /// Experiments currently in flight.
    #[must_use]
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Inspect the archive of finished runs.
    pub fn with_history<R>(&self, f: impl FnOnce(&ExperimentHistory) -> R) -> R {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        f(&history)
    }

    /// Ask the guard for admission and, if granted, start the run.
    ///
    /// The backend is added to the guard's fault registry if its kind is not
    /// registered yet, so an emergency stop can reach it.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionDenied` with the guard's reason when refused, or
    /// after [`shutdown`](Self::shutdown).
    pub async fn launch(
        &self,
        target_scope: &str,
        config: ExperimentConfig,
        backend: Arc<dyn InjectionBackend>,
    ) -> Result<JoinHandle<ExperimentLog>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::AdmissionDenied(REASON_SHUTTING_DOWN.to_string()));
        }

        let running = self.running();
        let admission = self.guard.is_experiment_allowed(target_scope, running).await;
        if !admission.allowed {
            warn!(
                experiment = config.name(),
                scope = target_scope,
                reason = %admission.reason,
                "experiment refused"
            );
            return Err(Error::AdmissionDenied(admission.reason));
        }

        let registry = self.guard.registry();
        if registry.get(backend.kind()).is_none() {
            registry.register(Arc::clone(&backend));
        }

        let slot = RunningSlot::acquire(Arc::clone(&self.running));
        let runner = Arc::clone(&self.runner);
        let history = Arc::clone(&self.history);
        let cancel = self.shutdown.child_token();
        info!(
            experiment = config.name(),
            scope = target_scope,
            running = running + 1,
            "experiment admitted"
        );

        Ok(tokio::spawn(async move {
            let _slot = slot;
            let log = runner
                .run_until_cancelled(&config, backend.as_ref(), &cancel)
                .await;
            history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record(log.clone());
            log
        }))
    }

    /// Cancel every in-flight run at its next tick. Each aborts and stops
    /// its own fault. Later launches are refused.
    pub fn shutdown(&self) {
        info!(running = self.running(), "cancelling in-flight experiments");
        self.shutdown.cancel();
    }
}

impl<M, S> std::fmt::Debug for ChaosEngine<M, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosEngine")
            .field("running", &self.running.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}
