//! Experiment runner - drives one experiment through its lifecycle
//!
//! ```text
//! PENDING: pre-check ──fail──> ABORTED            (fault never injected)
//!    │ pass
//! RUNNING: inject ──err──> stop, FAILED
//!    │
//!    ├─ every tick: sleep, check steady state
//!    │     violation longer than abort threshold ──> stop, ABORTED
//!    │     cancelled ──> stop, ABORTED
//!    │
//!    └─ all ticks done: stop ──err──> FAILED
//!          cooldown, post-check ──> COMPLETED | FAILED
//! ```
//!
//! `stop` is called exactly once on every path that called `inject`, and
//! never on the pre-check abort path.
//!
//! A violation is measured in consecutive failing ticks, so timer jitter and
//! query latency never change the outcome. With one-second ticks, `k`
//! consecutive failing ticks are a `k`-second violation. Abort fires once
//! that strictly exceeds the threshold; any passing tick resets the count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::experiment::{EventKind, ExperimentConfig, ExperimentLog, ExperimentState};
use crate::inject::InjectionBackend;
use crate::metrics::{MetricEvaluator, MetricSource};
use crate::notify::{Notifier, TracingNotifier};
use crate::Result;

const PRE_CHECK_FAILED: &str = "pre-experiment steady-state check failed";
const THRESHOLD_EXCEEDED: &str = "steady-state violation exceeded abort threshold";
const CANCELLED: &str = "experiment cancelled";

/// Runner tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Wait between monitoring checks; one tick per configured second.
    pub tick: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
        }
    }
}

/// Wall-clock start plus monotonic elapsed time, so event timestamps
/// never go backwards even if the system clock is adjusted mid-run.
struct RunClock {
    wall: DateTime<Utc>,
    mono: Instant,
}

impl RunClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            mono: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.wall
            + chrono::Duration::from_std(self.mono.elapsed())
                .unwrap_or_else(|_| chrono::Duration::zero())
    }
}

/// Guarantees the backend's `stop` is invoked at most once per run.
struct InjectedFault<'a, B: ?Sized> {
    backend: &'a B,
    stopped: bool,
}

impl<'a, B: InjectionBackend + ?Sized> InjectedFault<'a, B> {
    const fn new(backend: &'a B) -> Self {
        Self {
            backend,
            stopped: false,
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.backend.stop().await
    }
}

/// Orchestrates experiment runs against one metrics source.
///
/// A runner holds no per-run state and can drive many runs concurrently;
/// each call to [`run`](Self::run) owns its own [`ExperimentLog`].
pub struct ExperimentRunner<M> {
    evaluator: MetricEvaluator<M>,
    notifier: Arc<dyn Notifier>,
    settings: RunnerSettings,
}

impl<M: MetricSource> ExperimentRunner<M> {
    /// Create a runner that notifies through [`TracingNotifier`].
    #[must_use]
    pub fn new(evaluator: MetricEvaluator<M>) -> Self {
        Self {
            evaluator,
            notifier: Arc::new(TracingNotifier),
            settings: RunnerSettings::default(),
        }
    }

    /// Send lifecycle notifications to `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override runner settings.
    #[must_use]
    pub const fn with_settings(mut self, settings: RunnerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Steady-state evaluator in use.
    #[must_use]
    pub const fn evaluator(&self) -> &MetricEvaluator<M> {
        &self.evaluator
    }

    /// Run one experiment to a terminal state.
    ///
    /// Never fails: every outcome, including collaborator errors, is
    /// reported in the returned log.
    pub async fn run<B>(&self, config: &ExperimentConfig, backend: &B) -> ExperimentLog
    where
        B: InjectionBackend + ?Sized,
    {
        self.run_until_cancelled(config, backend, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but aborts at the next tick once `cancel`
    /// fires. Cancellation is only observed while waiting for a tick.
    pub async fn run_until_cancelled<B>(
        &self,
        config: &ExperimentConfig,
        backend: &B,
        cancel: &CancellationToken,
    ) -> ExperimentLog
    where
        B: InjectionBackend + ?Sized,
    {
        let span = info_span!("experiment", name = %config.name(), kind = %backend.kind());
        self.drive(config, backend, cancel).instrument(span).await
    }

    async fn drive<B>(
        &self,
        config: &ExperimentConfig,
        backend: &B,
        cancel: &CancellationToken,
    ) -> ExperimentLog
    where
        B: InjectionBackend + ?Sized,
    {
        let clock = RunClock::start();
        let mut log = ExperimentLog::new(config, clock.wall);
        let metrics = config.steady_state_metrics();

        for warning in config.validate() {
            warn!(%warning, "experiment configuration warning");
        }
        self.notify(&format!(
            "Chaos experiment '{}' starting: {}",
            config.name(),
            config.hypothesis()
        ));

        let pre = self.evaluator.check_steady_state(metrics).await;
        let pre_pass = pre.all_pass;
        let pre_failing: Vec<String> = pre.failing().into_iter().map(str::to_string).collect();
        log.set_pre_steady_state(pre);

        if !pre_pass {
            warn!(failing = ?pre_failing, "{PRE_CHECK_FAILED}; fault not injected");
            log.record(
                clock.now(),
                EventKind::Abort,
                json!({ "reason": PRE_CHECK_FAILED, "failing": pre_failing }),
            );
            finish(&mut log, &clock, ExperimentState::Aborted);
            self.notify(&format!(
                "Chaos experiment '{}' aborted: {PRE_CHECK_FAILED}",
                config.name()
            ));
            return log;
        }

        advance(&mut log, ExperimentState::Running);
        let mut fault = InjectedFault::new(backend);

        if let Err(e) = backend.inject().await {
            error!(error = %e, "fault injection failed");
            let stop_error = fault.stop().await.err().map(|e| e.to_string());
            log.record(
                clock.now(),
                EventKind::Error,
                json!({ "phase": "inject", "error": e.to_string(), "stop_error": stop_error }),
            );
            return self.fail(log, &clock, config, &format!("injection failed: {e}"));
        }
        info!("fault injected");
        log.record(
            clock.now(),
            EventKind::ChaosInjected,
            json!({ "kind": backend.kind() }),
        );

        let threshold = config.abort_threshold_seconds();
        let mut failing_ticks: u64 = 0;

        for tick in 1..=config.duration_seconds() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(tick, "cancellation requested");
                    return self
                        .abort(log, &clock, config, &mut fault, json!({ "reason": CANCELLED, "tick": tick }))
                        .await;
                }
                () = tokio::time::sleep(self.settings.tick) => {}
            }

            let report = self.evaluator.check_steady_state(metrics).await;
            debug!(tick, all_pass = report.all_pass, "steady-state check");
            log.record(
                clock.now(),
                EventKind::MetricCheck,
                json!({ "tick": tick, "all_pass": report.all_pass, "results": report.results }),
            );

            if report.all_pass {
                if failing_ticks > 0 {
                    info!(tick, failing_ticks, "steady state recovered within abort threshold");
                }
                failing_ticks = 0;
                continue;
            }

            failing_ticks += 1;
            if failing_ticks > threshold {
                let violated_for = self.settings.tick.saturating_mul(
                    u32::try_from(failing_ticks).unwrap_or(u32::MAX),
                );
                warn!(tick, failing_ticks, threshold_s = threshold, "{THRESHOLD_EXCEEDED}");
                let payload = json!({
                    "reason": THRESHOLD_EXCEEDED,
                    "tick": tick,
                    "failing_ticks": failing_ticks,
                    "violated_for_seconds": violated_for.as_secs_f64(),
                    "failing": report.failing(),
                });
                return self.abort(log, &clock, config, &mut fault, payload).await;
            }
        }

        if let Err(e) = fault.stop().await {
            error!(error = %e, "stopping fault failed");
            log.record(
                clock.now(),
                EventKind::Error,
                json!({ "phase": "stop", "error": e.to_string() }),
            );
            return self.fail(log, &clock, config, &format!("stopping fault failed: {e}"));
        }
        info!("fault stopped");
        log.record(
            clock.now(),
            EventKind::ChaosStopped,
            json!({ "kind": backend.kind() }),
        );

        if config.cooldown_seconds() > 0 {
            debug!(seconds = config.cooldown_seconds(), "cooling down");
            tokio::time::sleep(Duration::from_secs(config.cooldown_seconds())).await;
        }

        let post = self.evaluator.check_steady_state(metrics).await;
        let outcome = if post.all_pass {
            ExperimentState::Completed
        } else {
            warn!(failing = ?post.failing(), "post-experiment steady-state check failed");
            ExperimentState::Failed
        };
        log.set_post_steady_state(post);
        finish(&mut log, &clock, outcome);
        self.notify(&format!(
            "Chaos experiment '{}' finished: {outcome}",
            config.name()
        ));
        log
    }

    async fn abort<B>(
        &self,
        mut log: ExperimentLog,
        clock: &RunClock,
        config: &ExperimentConfig,
        fault: &mut InjectedFault<'_, B>,
        payload: serde_json::Value,
    ) -> ExperimentLog
    where
        B: InjectionBackend + ?Sized,
    {
        let stop_result = fault.stop().await;
        let reason = payload["reason"].as_str().unwrap_or(THRESHOLD_EXCEEDED).to_string();
        log.record(clock.now(), EventKind::Abort, payload);

        if let Err(e) = stop_result {
            error!(error = %e, "stopping fault during abort failed");
            log.record(
                clock.now(),
                EventKind::Error,
                json!({ "phase": "stop", "error": e.to_string() }),
            );
            return self.fail(log, clock, config, &format!("{reason}; stopping fault failed: {e}"));
        }

        finish(&mut log, clock, ExperimentState::Aborted);
        self.notify(&format!("Chaos experiment '{}' aborted: {reason}", config.name()));
        log
    }

    fn fail(
        &self,
        mut log: ExperimentLog,
        clock: &RunClock,
        config: &ExperimentConfig,
        detail: &str,
    ) -> ExperimentLog {
        finish(&mut log, clock, ExperimentState::Failed);
        self.notify(&format!("Chaos experiment '{}' failed: {detail}", config.name()));
        log
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.notify(message) {
            warn!(error = %e, "notification failed; continuing");
        }
    }
}

fn advance(log: &mut ExperimentLog, next: ExperimentState) {
    if let Err(e) = log.transition(next) {
        error!(error = %e, "illegal experiment state transition");
    }
}

fn finish(log: &mut ExperimentLog, clock: &RunClock, outcome: ExperimentState) {
    advance(log, outcome);
    log.close(clock.now());
    info!(state = %log.final_state(), events = log.events().len(), "experiment finished");
}

impl<M> std::fmt::Debug for ExperimentRunner<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentRunner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
