//! Storage seam for state shared between runners
//!
//! The blast-radius guard persists its circuit state through [`KvStore`],
//! so every runner in the process (or, with an external backend, every
//! process) observes an emergency stop on its next admission check.
//!
//! # Example
//!
//! ```rust
//! use chaos_harness::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> chaos_harness::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.set("chaos/circuit", br#"{"enabled":true}"#.to_vec()).await?;
//! assert!(store.exists("chaos/circuit").await?);
//!
//! store.delete("chaos/circuit").await?;
//! assert_eq!(store.get("chaos/circuit").await?, None);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use std::future::Future;

use crate::Result;

/// Byte-oriented async store for externally persisted state.
///
/// A completed `set` must be visible to every later `get`, from any task.
/// Values are replaced whole; readers never see a partial write.
pub trait KvStore: Send + Sync {
    /// Value under `key`, or `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Remove `key`. Removing an absent key succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Whether `key` holds a value.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;
}
