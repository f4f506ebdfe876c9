use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use tzun_kv::KvStore;

use super::{BucketStore, Document};
use crate::error::BucketError;
use crate::types::{BucketSet, Version};

/// [`BucketStore`] over any [`KvStore`].
///
/// Two keys per store:
///
/// ```text
/// {prefix}:revision  -> decimal revision, the version token
/// {prefix}:buckets   -> MessagePack-encoded set
/// ```
///
/// Saves are a single `compare_and_swap` guarded on the revision key.
pub struct KvBucketStore {
    kv: Arc<dyn KvStore>,
    revision_key: String,
    buckets_key: String,
}

impl KvBucketStore {
    pub fn new(kv: Arc<dyn KvStore>, prefix: &str) -> Self {
        Self {
            kv,
            revision_key: format!("{prefix}:revision"),
            buckets_key: format!("{prefix}:buckets"),
        }
    }

    fn parse_revision(raw: &[u8]) -> Option<u64> {
        std::str::from_utf8(raw).ok()?.parse().ok()
    }
}

#[async_trait]
impl BucketStore for KvBucketStore {
    async fn load(&self) -> Result<(BucketSet, Version), BucketError> {
        let keys = [self.revision_key.as_str(), self.buckets_key.as_str()];
        let mut values = self.kv.batch_get(&keys)?;
        let data = values.pop().flatten();
        let rev = values.pop().flatten();

        let (rev, data) = match (rev, data) {
            (None, None) => return Ok((BucketSet::new(), Version::none())),
            (Some(rev), Some(data)) => (rev, data),
            (Some(_), None) => {
                return Err(BucketError::StoreCorrupt(format!(
                    "{} set without {}",
                    self.revision_key, self.buckets_key
                )));
            }
            (None, Some(_)) => {
                return Err(BucketError::StoreCorrupt(format!(
                    "{} set without {}",
                    self.buckets_key, self.revision_key
                )));
            }
        };

        let revision = Self::parse_revision(&rev).ok_or_else(|| {
            BucketError::StoreCorrupt(format!("unparseable {}", self.revision_key))
        })?;
        let set: BucketSet = rmp_serde::from_slice(&data)
            .map_err(|e| BucketError::StoreCorrupt(format!("decode buckets: {e}")))?;
        if set.revision != revision {
            return Err(BucketError::StoreCorrupt(format!(
                "document revision {} does not match {revision}",
                set.revision
            )));
        }
        set.validate()?;

        debug!(revision, buckets = set.len(), "kv bucket store loaded");
        Ok((set, Version::new(revision.to_string())))
    }

    async fn save(&self, set: &BucketSet, expected: &Version) -> Result<Version, BucketError> {
        let current = if expected.is_none() {
            None
        } else {
            let rev = expected.as_str().parse::<u64>().map_err(|_| {
                BucketError::StoreConflict(format!("foreign version token {expected}"))
            })?;
            Some(rev)
        };
        let next = current.map_or(1, |rev| rev + 1);

        let data = rmp_serde::to_vec_named(&Document::new(set, next))
            .map_err(|e| BucketError::StoreUnavailable(format!("encode buckets: {e}")))?;
        let expected_raw = current.map(|rev| rev.to_string());
        let next_raw = next.to_string();

        let swapped = self.kv.compare_and_swap(
            &self.revision_key,
            expected_raw.as_deref().map(str::as_bytes),
            &[
                (self.revision_key.as_str(), next_raw.as_bytes()),
                (self.buckets_key.as_str(), data.as_slice()),
            ],
        )?;
        if !swapped {
            return Err(BucketError::StoreConflict(format!(
                "{} moved past {expected}",
                self.revision_key
            )));
        }

        debug!(revision = next, buckets = set.len(), "kv bucket store saved");
        Ok(Version::new(next_raw))
    }
}
