//! Blast-radius guard: admission, emergency stop and cleanup

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chaos_harness::guard::{
    BlastRadiusGuard, CircuitState, CircuitStore, REASON_EMERGENCY_STOP,
};
use chaos_harness::inject::FaultRegistry;
use chaos_harness::kv::{KvStore, MemoryKvStore};
use chaos_harness::{Error, Result};
use common::CountingBackend;

fn guard_with(backends: &[Arc<CountingBackend>]) -> BlastRadiusGuard<MemoryKvStore> {
    let registry = Arc::new(FaultRegistry::new());
    for backend in backends {
        registry.register(backend.clone());
    }
    BlastRadiusGuard::new(CircuitStore::new(MemoryKvStore::new()), registry)
}

/// KV store that can be switched into an outage.
#[derive(Default)]
struct FlakyKv {
    inner: MemoryKvStore,
    down: AtomicBool,
}

impl FlakyKv {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::StoreError("config map API timed out".to_string()));
        }
        Ok(())
    }
}

impl KvStore for FlakyKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.exists(key).await
    }
}

// =============================================================================
// Emergency stop
// =============================================================================

#[tokio::test]
async fn test_emergency_stop_cleans_every_kind_and_blocks_admission() {
    let pods = Arc::new(CountingBackend::new("pod-chaos").with_active(&["kill-api-0"]));
    let network = Arc::new(CountingBackend::new("network-chaos").with_active(&["delay-db"]));
    let guard = guard_with(&[pods.clone(), network.clone()]);

    let report = guard.trigger_emergency_stop("manual").await;

    assert_eq!(pods.stops(), 1);
    assert_eq!(network.stops(), 1);
    assert!(report.is_clean());
    assert_eq!(report.reason, "manual");
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].kind, "network-chaos");
    assert_eq!(report.outcomes[0].active_instances, vec!["delay-db"]);
    assert_eq!(report.outcomes[1].kind, "pod-chaos");

    let admission = guard.is_experiment_allowed("checkout", 0).await;
    assert!(!admission.allowed);
    assert_eq!(admission.reason, REASON_EMERGENCY_STOP);

    let state = guard.state().await.unwrap();
    assert!(state.emergency_stop);
    assert_eq!(state.emergency_stop_reason.as_deref(), Some("manual"));
}

#[tokio::test]
async fn test_emergency_stop_latches_until_reset() {
    let guard = guard_with(&[]);
    guard.trigger_emergency_stop("error budget exhausted").await;

    for (scope, running) in [("checkout", 0), ("search", 1), ("payments", 2)] {
        let admission = guard.is_experiment_allowed(scope, running).await;
        assert_eq!(admission.reason, REASON_EMERGENCY_STOP);
    }

    guard.reset_emergency_stop().await.unwrap();

    let admission = guard.is_experiment_allowed("checkout", 0).await;
    assert!(admission.allowed);
    assert!(guard.state().await.unwrap().emergency_stop_reason.is_none());
}

#[tokio::test]
async fn test_emergency_stop_is_idempotent() {
    let pods = Arc::new(CountingBackend::new("pod-chaos"));
    let guard = guard_with(&[pods.clone()]);

    let first = guard.trigger_emergency_stop("drill").await;
    let second = guard.trigger_emergency_stop("drill").await;

    assert!(first.is_clean());
    assert!(second.is_clean());
    assert!(second.outcomes[0].active_instances.is_empty());
    assert_eq!(pods.stops(), 2);
}

#[tokio::test]
async fn test_partial_cleanup_failure_continues() {
    let broken = Arc::new(CountingBackend::new("io-chaos").failing_stop());
    let healthy = Arc::new(CountingBackend::new("pod-chaos"));
    let guard = guard_with(&[broken.clone(), healthy.clone()]);

    let report = guard.trigger_emergency_stop("manual").await;

    assert_eq!(broken.stops(), 1);
    assert_eq!(healthy.stops(), 1);
    assert!(!report.is_clean());
    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].kind, "io-chaos");
    assert!(failures[0]
        .error
        .as_deref()
        .unwrap()
        .contains("api server unreachable"));

    // The flag is still latched
    assert_eq!(
        guard.is_experiment_allowed("checkout", 0).await.reason,
        REASON_EMERGENCY_STOP
    );
}

#[tokio::test]
async fn test_panicking_backend_does_not_stop_cleanup() {
    let crashing = Arc::new(CountingBackend::new("kernel-chaos").panicking_stop());
    let healthy = Arc::new(CountingBackend::new("pod-chaos"));
    let guard = guard_with(&[crashing, healthy.clone()]);

    let report = guard.trigger_emergency_stop("manual").await;

    assert_eq!(healthy.stops(), 1);
    assert_eq!(report.failures().len(), 1);
    assert!(report.failures()[0]
        .error
        .as_deref()
        .unwrap()
        .contains("panicked"));
}

// =============================================================================
// Store failures
// =============================================================================

#[tokio::test]
async fn test_unreadable_state_fails_closed() {
    let kv = FlakyKv::default();
    kv.down.store(true, Ordering::SeqCst);
    let guard = BlastRadiusGuard::new(CircuitStore::new(kv), Arc::new(FaultRegistry::new()));

    let admission = guard.is_experiment_allowed("checkout", 0).await;

    assert!(!admission.allowed);
    assert!(admission.reason.starts_with("Circuit state unavailable"));
    assert!(guard.state().await.is_err());
}

#[tokio::test]
async fn test_emergency_stop_cleans_up_even_if_flag_cannot_be_saved() {
    let kv = FlakyKv::default();
    kv.down.store(true, Ordering::SeqCst);
    let pods = Arc::new(CountingBackend::new("pod-chaos"));
    let registry = Arc::new(FaultRegistry::new());
    registry.register(pods.clone());
    let guard = BlastRadiusGuard::new(CircuitStore::new(kv), registry);

    let report = guard.trigger_emergency_stop("manual").await;

    assert_eq!(pods.stops(), 1);
    assert!(report.state_error.is_some());
    assert!(!report.is_clean());
    assert!(guard.reset_emergency_stop().await.is_err());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_never_observe_partial_state() {
    let guard = Arc::new(guard_with(&[]));

    let writer = {
        let guard = Arc::clone(&guard);
        tokio::spawn(async move {
            for i in 0..50 {
                guard.trigger_emergency_stop(&format!("drill-{i}")).await;
                guard.reset_emergency_stop().await.unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..8 {
        let guard = Arc::clone(&guard);
        readers.push(tokio::spawn(async move {
            for _ in 0..100 {
                let state: CircuitState = guard.state().await.unwrap();
                // Flag and reason are always written together
                assert_eq!(state.emergency_stop, state.emergency_stop_reason.is_some());
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(!guard.state().await.unwrap().emergency_stop);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_operator_writes_are_not_lost() {
    let guard = Arc::new(guard_with(&[]));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let guard = Arc::clone(&guard);
        tasks.push(tokio::spawn(async move {
            guard.exclude_scope(&format!("team-{i}")).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let state = guard.state().await.unwrap();
    // 20 new scopes plus the default kube-system exclusion
    assert_eq!(state.excluded_scopes.len(), 21);
}
