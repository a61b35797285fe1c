//! Process-local circuit state backend.
//!
//! State is lost on restart. Multi-process deployments plug an external
//! store into [`KvStore`] instead.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use super::KvStore;
use crate::Result;

/// [`KvStore`] backed by a sharded concurrent map.
///
/// Each key is replaced as a whole, so a reader sees either the previous
/// or the new value. A write counter lets operators and tests observe how
/// often shared state changed.
///
/// # Example
///
/// ```rust
/// use chaos_harness::kv::{KvStore, MemoryKvStore};
///
/// # async fn example() -> chaos_harness::Result<()> {
/// let store = MemoryKvStore::new();
/// store.set("chaos/circuit", b"{}".to_vec()).await?;
/// assert_eq!(store.writes(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Vec<u8>, FxBuildHasher>,
    writes: AtomicU64,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no key is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Completed `set` calls plus effective deletes (ones that removed a key).
    #[must_use]
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        self.writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.writes.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}
