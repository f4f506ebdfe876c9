//! Key-value store interface and implementations.
//!
//! A small trait-based KV layer with an in-memory implementation for tests
//! and a redb-backed implementation for persistence. Besides plain reads and
//! writes it offers a guarded batch write ([`KvStore::compare_and_swap`]),
//! which is what optimistic-concurrency callers build on.

pub mod memory;
pub mod redb;

use std::fmt;
use thiserror::Error;

/// Errors that can occur in KV store operations.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("kv: storage error: {0}")]
    Storage(String),

    #[error("kv: lock poisoned")]
    Poisoned,
}

/// Result type for KV operations.
pub type KvResult<T> = Result<T, KvError>;

/// Key-value store with string keys and byte values.
///
/// Implementations must be safe for concurrent use. Every method is atomic
/// on its own: a guarded write applies all entries or none.
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>>;

    /// Set a key-value pair.
    fn set(&self, key: &str, value: &[u8]) -> KvResult<()>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> KvResult<()>;

    /// Read several keys from one consistent snapshot.
    /// The result has one slot per requested key, in request order.
    fn batch_get(&self, keys: &[&str]) -> KvResult<Vec<Option<Vec<u8>>>>;

    /// Write `entries` atomically, but only if the current value stored at
    /// `guard` equals `expected` (`None` means the key must be absent).
    ///
    /// Returns `Ok(false)` without writing anything when the guard check
    /// fails.
    fn compare_and_swap(
        &self,
        guard: &str,
        expected: Option<&[u8]>,
        entries: &[(&str, &[u8])],
    ) -> KvResult<bool>;
}

impl fmt::Debug for dyn KvStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KvStore {{ ... }}")
    }
}

pub use memory::MemoryStore;
pub use redb::RedbStore;
