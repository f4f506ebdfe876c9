//! Versioned persistence for [`BucketSet`]s.
//!
//! Every backend hands out an opaque [`Version`] on load and accepts it back
//! on save; a save only lands when the store is still at that version.

mod github;
mod kv;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BucketError;
use crate::types::{Bucket, BucketSet, Version};

pub use github::{GithubBucketStore, GithubConfig};
pub use kv::KvBucketStore;

/// Durable, conditionally-writable home of the bucket set.
///
/// Implementations must be safe for concurrent use.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Reads the current set and its version. A store that was never
    /// written yields an empty set and [`Version::none`].
    ///
    /// Fails with `StoreUnavailable` when the medium cannot be read and
    /// `StoreCorrupt` when its contents are not a well-formed set.
    async fn load(&self) -> Result<(BucketSet, Version), BucketError>;

    /// Writes `set` if the store is still at `expected` and returns the new
    /// version. The persisted revision is one past the one that was loaded.
    ///
    /// Fails with `StoreConflict`, leaving the store untouched, when another
    /// writer got there first.
    async fn save(&self, set: &BucketSet, expected: &Version) -> Result<Version, BucketError>;
}

/// Borrowed [`BucketSet`] with an overridden revision; serializes to the
/// same layout.
#[derive(Serialize)]
struct Document<'a> {
    revision: u64,
    buckets: &'a [Bucket],
}

impl<'a> Document<'a> {
    fn new(set: &'a BucketSet, revision: u64) -> Self {
        Self {
            revision,
            buckets: &set.buckets,
        }
    }
}
