//! Experiment Log - the append-only record of one run

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExperimentConfig, ExperimentState};
use crate::metrics::SteadyStateReport;
use crate::{Error, Result};

/// Kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The fault was injected.
    ChaosInjected,
    /// One monitoring tick's steady-state check.
    MetricCheck,
    /// The fault was stopped at natural completion.
    ChaosStopped,
    /// The run was aborted; payload carries the reason.
    Abort,
    /// A collaborator failed; payload carries the detail.
    Error,
}

impl EventKind {
    /// Snake-case name as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChaosInjected => "chaos_injected",
            Self::MetricCheck => "metric_check",
            Self::ChaosStopped => "chaos_stopped",
            Self::Abort => "abort",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single timestamped lifecycle event. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEvent {
    timestamp: DateTime<Utc>,
    kind: EventKind,
    payload: serde_json::Value,
}

impl ExperimentEvent {
    /// When the event was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Event payload.
    #[must_use]
    pub const fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// Outcome record of one experiment run.
///
/// Owned by a single run and handed back to the caller. Events can only be
/// appended, and their timestamps never decrease. Once a terminal state is
/// reached it cannot change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentLog {
    name: String,
    hypothesis: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    pre_steady_state: Option<SteadyStateReport>,
    post_steady_state: Option<SteadyStateReport>,
    events: Vec<ExperimentEvent>,
    final_state: ExperimentState,
}

impl ExperimentLog {
    /// Open a log in `PENDING` for the given configuration.
    #[must_use]
    pub fn new(config: &ExperimentConfig, start_time: DateTime<Utc>) -> Self {
        Self {
            name: config.name().to_string(),
            hypothesis: config.hypothesis().to_string(),
            start_time,
            end_time: None,
            pre_steady_state: None,
            post_steady_state: None,
            events: Vec::new(),
            final_state: ExperimentState::Pending,
        }
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

    /// Run start time.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Run end time, once terminal.
    #[must_use]
    pub const fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    /// Result of the pre-injection steady-state check.
    #[must_use]
    pub const fn pre_steady_state(&self) -> Option<&SteadyStateReport> {
        self.pre_steady_state.as_ref()
    }

    /// Result of the post-cooldown steady-state check.
    #[must_use]
    pub const fn post_steady_state(&self) -> Option<&SteadyStateReport> {
        self.post_steady_state.as_ref()
    }

    /// All events in recording order.
    #[must_use]
    pub fn events(&self) -> &[ExperimentEvent] {
        &self.events
    }

    /// Events of one kind, in recording order.
    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &ExperimentEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Number of events of one kind.
    #[must_use]
    pub fn count(&self, kind: EventKind) -> usize {
        self.events_of(kind).count()
    }

    /// Current state; final once [`ExperimentState::is_terminal`].
    #[must_use]
    pub const fn final_state(&self) -> ExperimentState {
        self.final_state
    }

    /// Append an event.
    ///
    /// A timestamp earlier than the previous event's is raised to it.
    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        kind: EventKind,
        payload: serde_json::Value,
    ) {
        let timestamp = self
            .events
            .last()
            .map_or(timestamp, |last| timestamp.max(last.timestamp));
        self.events.push(ExperimentEvent {
            timestamp,
            kind,
            payload,
        });
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for an illegal edge, including any
    /// attempt to leave a terminal state.
    pub fn transition(&mut self, next: ExperimentState) -> Result<()> {
        if !self.final_state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.final_state.to_string(),
                to: next.to_string(),
            });
        }
        self.final_state = next;
        Ok(())
    }

    pub(crate) fn set_pre_steady_state(&mut self, report: SteadyStateReport) {
        self.pre_steady_state = Some(report);
    }

    pub(crate) fn set_post_steady_state(&mut self, report: SteadyStateReport) {
        self.post_steady_state = Some(report);
    }

    pub(crate) fn close(&mut self, end_time: DateTime<Utc>) {
        let last = self.events.last().map_or(self.start_time, |e| e.timestamp);
        self.end_time = Some(end_time.max(last));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> ExperimentConfig {
        ExperimentConfig::builder("network-delay")
            .hypothesis("p99 stays under 500ms")
            .duration_seconds(3)
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_log_is_pending() {
        let log = ExperimentLog::new(&config(), Utc::now());
        assert_eq!(log.name(), "network-delay");
        assert_eq!(log.hypothesis(), "p99 stays under 500ms");
        assert_eq!(log.final_state(), ExperimentState::Pending);
        assert!(log.events().is_empty());
        assert!(log.end_time().is_none());
    }

    #[test]
    fn test_record_clamps_backwards_timestamps() {
        let start = Utc::now();
        let mut log = ExperimentLog::new(&config(), start);

        log.record(start + Duration::seconds(2), EventKind::ChaosInjected, serde_json::json!({}));
        log.record(start, EventKind::MetricCheck, serde_json::json!({}));

        let events = log.events();
        assert_eq!(events[1].timestamp(), events[0].timestamp());
        assert_eq!(log.count(EventKind::MetricCheck), 1);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let mut log = ExperimentLog::new(&config(), Utc::now());
        log.transition(ExperimentState::Running).unwrap();
        log.transition(ExperimentState::Aborted).unwrap();

        let err = log.transition(ExperimentState::Completed).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(log.final_state(), ExperimentState::Aborted);
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&EventKind::ChaosInjected).unwrap();
        assert_eq!(json, r#""chaos_injected""#);
        assert_eq!(EventKind::MetricCheck.to_string(), "metric_check");
    }
}
