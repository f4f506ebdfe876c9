use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BucketError;

/// A semantic cluster of labels.
///
/// The first label to land in a bucket becomes its `canonical_label` and
/// its embedding becomes the representative every later label is compared
/// against.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Stable identifier (e.g. "bucket:001"). Never changes.
    pub id: String,

    /// Raw text of the creating label, case and whitespace preserved.
    pub canonical_label: String,

    /// Trimmed, lowercased `canonical_label`.
    pub normalized_key: String,

    pub representative_embedding: Vec<f32>,

    /// Raw labels that resolved here, in arrival order, creator first.
    pub examples: Vec<String>,

    /// Classification calls resolved to this bucket, including its creation.
    pub match_count: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bucket {
    pub(crate) fn new(
        id: String,
        label: &str,
        key: String,
        embedding: Vec<f32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            canonical_label: label.to_string(),
            normalized_key: key,
            representative_embedding: embedding,
            examples: vec![label.to_string()],
            match_count: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("canonical_label", &self.canonical_label)
            .field("match_count", &self.match_count)
            .field("examples", &self.examples.len())
            .field("embedding_len", &self.representative_embedding.len())
            .finish()
    }
}

/// The full persisted state: every bucket in insertion order plus the
/// store-level revision counter.
///
/// This is also the on-disk document layout of every backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketSet {
    pub revision: u64,
    pub buckets: Vec<Bucket>,
}

impl BucketSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Embedding dimension shared by the set, or `None` while it is empty.
    pub fn dimension(&self) -> Option<usize> {
        self.buckets
            .first()
            .map(|b| b.representative_embedding.len())
    }

    pub fn get(&self, id: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.id == id)
    }

    /// Index of the first bucket whose normalized key equals `key`.
    pub fn find_by_key(&self, key: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.normalized_key == key)
    }

    /// Checks the structural invariants a loaded set must hold.
    pub fn validate(&self) -> Result<(), BucketError> {
        let Some(dim) = self.dimension() else {
            return Ok(());
        };
        if dim == 0 {
            return Err(BucketError::StoreCorrupt(format!(
                "bucket {} has an empty embedding",
                self.buckets[0].id
            )));
        }
        let mut seen = HashSet::with_capacity(self.buckets.len());
        for b in &self.buckets {
            if b.representative_embedding.len() != dim {
                return Err(BucketError::StoreCorrupt(format!(
                    "bucket {} has dimension {}, expected {dim}",
                    b.id,
                    b.representative_embedding.len()
                )));
            }
            if !seen.insert(b.id.as_str()) {
                return Err(BucketError::StoreCorrupt(format!(
                    "duplicate bucket id {}",
                    b.id
                )));
            }
        }
        Ok(())
    }
}

/// Opaque optimistic-concurrency token handed out by a
/// [`crate::BucketStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The version of a store that has never been written.
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("<none>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Result of classifying one label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub bucket_id: String,

    /// Canonical label of the bucket.
    pub label: String,

    /// Similarity to the bucket representative; `None` when the bucket was
    /// created by this call.
    pub confidence: Option<f32>,

    pub created: bool,
}
