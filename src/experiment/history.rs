//! Experiment History - in-memory archive of finished runs

use super::{ExperimentLog, ExperimentState};

/// Append-only archive of finished experiment logs.
///
/// Logs are stored in arrival order; per-experiment queries return them
/// ordered by start time, since concurrent runs may finish out of order.
#[derive(Debug, Default)]
pub struct ExperimentHistory {
    logs: Vec<ExperimentLog>,
}

impl ExperimentHistory {
    /// Create a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a finished log.
    pub fn record(&mut self, log: ExperimentLog) {
        self.logs.push(log);
    }

    /// Number of archived runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Check if nothing has been archived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// All runs of the named experiment, ordered by start time.
    #[must_use]
    pub fn runs_for(&self, name: &str) -> Vec<&ExperimentLog> {
        let mut runs: Vec<&ExperimentLog> =
            self.logs.iter().filter(|log| log.name() == name).collect();

        runs.sort_by_key(|log| log.start_time());

        runs
    }

    /// Most recently started run of the named experiment.
    #[must_use]
    pub fn last_for(&self, name: &str) -> Option<&ExperimentLog> {
        self.logs
            .iter()
            .filter(|log| log.name() == name)
            .max_by_key(|log| log.start_time())
    }

    /// Number of archived runs that ended in `state`.
    #[must_use]
    pub fn count_by_state(&self, state: ExperimentState) -> usize {
        self.logs
            .iter()
            .filter(|log| log.final_state() == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentConfig;
    use chrono::{Duration, Utc};

    fn log(name: &str, offset_secs: i64, outcome: ExperimentState) -> ExperimentLog {
        let config = ExperimentConfig::builder(name).build().unwrap();
        let mut log = ExperimentLog::new(&config, Utc::now() + Duration::seconds(offset_secs));
        if outcome != ExperimentState::Aborted {
            log.transition(ExperimentState::Running).unwrap();
        }
        log.transition(outcome).unwrap();
        log
    }

    #[test]
    fn test_history_default() {
        let history = ExperimentHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
        assert!(history.last_for("anything").is_none());
    }

    #[test]
    fn test_runs_for_orders_by_start_time() {
        let mut history = ExperimentHistory::new();

        // Finished out of order
        history.record(log("cpu-hog", 20, ExperimentState::Completed));
        history.record(log("cpu-hog", 0, ExperimentState::Failed));
        history.record(log("disk-fill", 5, ExperimentState::Completed));
        history.record(log("cpu-hog", 10, ExperimentState::Aborted));

        let runs = history.runs_for("cpu-hog");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].final_state(), ExperimentState::Failed);
        assert_eq!(runs[1].final_state(), ExperimentState::Aborted);
        assert_eq!(runs[2].final_state(), ExperimentState::Completed);

        assert_eq!(
            history.last_for("cpu-hog").map(ExperimentLog::final_state),
            Some(ExperimentState::Completed)
        );
    }

    #[test]
    fn test_count_by_state() {
        let mut history = ExperimentHistory::new();
        history.record(log("a", 0, ExperimentState::Completed));
        history.record(log("b", 0, ExperimentState::Completed));
        history.record(log("c", 0, ExperimentState::Aborted));

        assert_eq!(history.count_by_state(ExperimentState::Completed), 2);
        assert_eq!(history.count_by_state(ExperimentState::Aborted), 1);
        assert_eq!(history.count_by_state(ExperimentState::Failed), 0);
    }
}
