//! Circuit state and its persisted store

use serde::{Deserialize, Serialize};

use super::Admission;
use crate::kv::KvStore;
use crate::{Error, Result};

/// Key under which the circuit state is persisted by default.
pub const DEFAULT_STATE_KEY: &str = "chaos-harness/circuit-state";

/// Reason returned while chaos is globally disabled.
pub const REASON_DISABLED: &str = "Chaos experiments are disabled";
/// Reason returned while the emergency stop is latched.
pub const REASON_EMERGENCY_STOP: &str = "Emergency stop is active";
/// Reason returned when every check passes.
pub const REASON_ALLOWED: &str = "Experiment allowed";

/// Process-wide admission-control state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitState {
    /// Master switch; `false` refuses every experiment.
    pub enabled: bool,
    /// Latched kill switch set by an emergency stop.
    pub emergency_stop: bool,
    /// Why the emergency stop was triggered.
    #[serde(default)]
    pub emergency_stop_reason: Option<String>,
    /// Upper bound on concurrently running experiments (soft, see guard docs).
    pub max_concurrent: usize,
    /// Target scopes in which no fault may be injected.
    #[serde(default)]
    pub excluded_scopes: Vec<String>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            enabled: true,
            emergency_stop: false,
            emergency_stop_reason: None,
            max_concurrent: 3,
            excluded_scopes: vec!["kube-system".to_string()],
        }
    }
}

impl CircuitState {
    /// Decide admission for one experiment.
    ///
    /// Checks run in a fixed order and the first failing one wins:
    /// disabled, emergency stop, excluded scope, concurrency cap.
    #[must_use]
    pub fn evaluate(&self, target_scope: &str, running: usize) -> Admission {
        if !self.enabled {
            return Admission::denied(REASON_DISABLED);
        }
        if self.emergency_stop {
            return Admission::denied(REASON_EMERGENCY_STOP);
        }
        if self.excluded_scopes.iter().any(|scope| scope == target_scope) {
            return Admission::denied(format!("Target scope '{target_scope}' is excluded"));
        }
        if running >= self.max_concurrent {
            return Admission::denied(format!(
                "Maximum concurrent experiments reached ({running}/{})",
                self.max_concurrent
            ));
        }
        Admission::granted()
    }
}

/// Reads and writes [`CircuitState`] as JSON under one key of a [`KvStore`].
#[derive(Debug)]
pub struct CircuitStore<S> {
    kv: S,
    key: String,
}

impl<S: KvStore> CircuitStore<S> {
    /// Store the state under [`DEFAULT_STATE_KEY`].
    #[must_use]
    pub fn new(kv: S) -> Self {
        Self::with_key(kv, DEFAULT_STATE_KEY)
    }

    /// Store the state under a custom key.
    #[must_use]
    pub fn with_key(kv: S, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// Key in use.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state; [`CircuitState::default`] if nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend fails or the record is corrupt.
    pub async fn load(&self) -> Result<CircuitState> {
        let Some(bytes) = self.kv.get(&self.key).await? else {
            return Ok(CircuitState::default());
        };
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::StoreError(format!("corrupt circuit state at '{}': {e}", self.key)))
    }

    /// Replace the saved state.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    pub async fn save(&self, state: &CircuitState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.kv.set(&self.key, bytes).await
    }
}
