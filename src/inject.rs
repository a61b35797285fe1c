//! Fault injection backends
//!
//! A backend owns one fault kind (pod kill, network delay, IO latency...)
//! and exposes idempotent `inject`/`stop`. The engine never knows how a
//! fault is physically applied.
//!
//! Backends are shared between the runner driving an experiment and the
//! blast-radius guard's emergency cleanup, which may call `stop` on the same
//! backend concurrently. Both calls must be safe to repeat.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::Result;

/// Pluggable fault-injection collaborator for one fault kind.
#[async_trait]
pub trait InjectionBackend: Send + Sync {
    /// Fault kind served by this backend, e.g. `"pod-chaos"`.
    fn kind(&self) -> &str;

    /// Apply the fault. Idempotent.
    async fn inject(&self) -> Result<()>;

    /// Remove every active instance of this fault kind, across all scopes
    /// the backend can reach.
    ///
    /// Must succeed when nothing is active, including when `inject` was
    /// never called or only partially succeeded.
    async fn stop(&self) -> Result<()>;

    /// Identifiers of currently active fault instances, for cleanup
    /// reporting. Backends that cannot enumerate return an empty list.
    async fn active_instances(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Registry of every injectable fault kind known to the process.
///
/// The emergency stop walks this registry to force-remove active faults.
#[derive(Default)]
pub struct FaultRegistry {
    backends: DashMap<String, Arc<dyn InjectionBackend>>,
}

impl FaultRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under its kind, returning any backend it replaced.
    pub fn register(&self, backend: Arc<dyn InjectionBackend>) -> Option<Arc<dyn InjectionBackend>> {
        self.backends.insert(backend.kind().to_string(), backend)
    }

    /// Remove the backend for `kind`.
    pub fn unregister(&self, kind: &str) -> Option<Arc<dyn InjectionBackend>> {
        self.backends.remove(kind).map(|(_, backend)| backend)
    }

    /// Backend registered for `kind`.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<Arc<dyn InjectionBackend>> {
        self.backends.get(kind).map(|entry| Arc::clone(entry.value()))
    }

    /// Registered kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.backends.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Snapshot of all backends, sorted by kind.
    #[must_use]
    pub fn backends(&self) -> Vec<Arc<dyn InjectionBackend>> {
        let mut backends: Vec<Arc<dyn InjectionBackend>> = self
            .backends
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        backends.sort_by(|a, b| a.kind().cmp(b.kind()));
        backends
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Check if no kind is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for FaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
