//! Best-effort forced removal of active faults

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::inject::InjectionBackend;

/// Cleanup result for one fault kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    /// Fault kind.
    pub kind: String,
    /// Instances that were active before `stop` was requested.
    pub active_instances: Vec<String>,
    /// Failure detail if `stop` failed or the task panicked.
    pub error: Option<String>,
}

/// What an emergency stop did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Operator-supplied reason.
    pub reason: String,
    /// One entry per registered fault kind, sorted by kind.
    pub outcomes: Vec<CleanupOutcome>,
    /// Set if the emergency-stop flag could not be persisted.
    pub state_error: Option<String>,
}

impl CleanupReport {
    /// Whether the flag was persisted and every kind stopped cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.state_error.is_none() && self.outcomes.iter().all(|o| o.error.is_none())
    }

    /// Kinds whose cleanup failed.
    #[must_use]
    pub fn failures(&self) -> Vec<&CleanupOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some()).collect()
    }
}

/// Stop every backend, each in its own task.
///
/// A failure or panic in one task is recorded for that kind only; the
/// remaining kinds are still stopped.
pub(crate) async fn stop_all(backends: Vec<Arc<dyn InjectionBackend>>) -> Vec<CleanupOutcome> {
    let tasks: Vec<_> = backends
        .into_iter()
        .map(|backend| {
            let kind = backend.kind().to_string();
            (kind, tokio::spawn(stop_one(backend)))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(tasks.len());
    for (kind, task) in tasks {
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!(kind = %kind, error = %e, "cleanup task panicked");
                outcomes.push(CleanupOutcome {
                    kind,
                    active_instances: Vec::new(),
                    error: Some(format!("cleanup task panicked: {e}")),
                });
            }
        }
    }
    outcomes
}

async fn stop_one(backend: Arc<dyn InjectionBackend>) -> CleanupOutcome {
    let kind = backend.kind().to_string();

    let active_instances = match backend.active_instances().await {
        Ok(instances) => instances,
        Err(e) => {
            warn!(kind = %kind, error = %e, "could not list active faults; stopping blind");
            Vec::new()
        }
    };

    let error = match backend.stop().await {
        Ok(()) => {
            info!(kind = %kind, removed = active_instances.len(), "fault kind cleaned up");
            None
        }
        Err(e) => {
            warn!(kind = %kind, error = %e, "fault cleanup failed");
            Some(e.to_string())
        }
    };

    CleanupOutcome {
        kind,
        active_instances,
        error,
    }
}
