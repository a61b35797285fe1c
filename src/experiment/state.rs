//! Experiment lifecycle state

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an experiment run.
///
/// ```text
/// PENDING ──> RUNNING ──> COMPLETED | ABORTED | FAILED
///    └──────────────────> ABORTED   (pre-check failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentState {
    /// Created, pre-check not yet passed.
    Pending,
    /// Fault injected, monitoring in progress.
    Running,
    /// Ran to completion and the post-check passed.
    Completed,
    /// Stopped early: pre-check failed, abort window exceeded, or cancelled.
    Aborted,
    /// Collaborator error, or the post-check failed.
    Failed,
}

impl ExperimentState {
    /// Whether the state is final.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Failed)
    }

    /// Whether `self -> next` is a legal lifecycle edge.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running | Self::Aborted)
                | (Self::Running, Self::Completed | Self::Aborted | Self::Failed)
        )
    }

    /// Upper-case name as used in logs and serialized output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
