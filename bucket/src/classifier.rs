use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use tzun_embed::Embedder;

use crate::error::{BucketError, ClassifyError};
use crate::policy::{AssignPolicy, DEFAULT_ID_PREFIX, Strategy, normalize};
use crate::store::BucketStore;
use crate::types::{Bucket, BucketSet, Classification, Version};

/// Default number of reload-and-retry rounds after a save conflict.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Controls classifier behavior.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub strategy: Strategy,

    /// Retries after the first save attempt when another writer won the
    /// race. 0 means a single attempt.
    pub max_retries: usize,

    /// Cap on recorded examples per bucket.
    pub max_examples: Option<usize>,

    /// Prepended to generated ids (e.g. "bucket" -> "bucket:001").
    pub id_prefix: String,

    /// Applied separately to the embed, load and save steps. A save that
    /// runs out of time is checked against a fresh load before it is
    /// reported as failed.
    pub timeout: Option<Duration>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_examples: None,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            timeout: None,
        }
    }
}

/// Assigns labels to buckets, persisting every new or grown bucket through
/// the store's conditional write.
///
/// Holds no in-process lock: concurrent calls (from this or any other
/// process sharing the store) are serialized by the store's version check
/// and a losing call reloads and re-matches.
pub struct Classifier {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn BucketStore>,
    policy: AssignPolicy,
    max_retries: usize,
    timeout: Option<Duration>,
}

impl Classifier {
    pub fn new(
        cfg: ClassifierConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn BucketStore>,
    ) -> Self {
        let policy = AssignPolicy {
            strategy: cfg.strategy,
            max_examples: cfg.max_examples,
            id_prefix: cfg.id_prefix,
        };
        Self {
            embedder,
            store,
            policy,
            max_retries: cfg.max_retries,
            timeout: cfg.timeout,
        }
    }

    /// Resolves `title` to a bucket, creating one if nothing is similar
    /// enough.
    ///
    /// The title is taken as is; an empty or all-whitespace title is legal.
    /// It is never sent to the embedder and always lands in the bucket keyed
    /// by the empty string.
    pub async fn classify(&self, title: &str) -> Result<Classification, ClassifyError> {
        let embedding = self
            .embed(title)
            .await
            .map_err(|e| failure(title, e, None))?;
        debug!(title, dim = embedding.len(), "embedded");
        self.commit(title, &embedding).await
    }

    /// Classifies `titles` in order, embedding all of them with a single
    /// batch call to the provider.
    ///
    /// Results line up with `titles`. If the batch embedding fails, every
    /// title carries that error and the store is not touched.
    pub async fn classify_batch(
        &self,
        titles: &[&str],
    ) -> Vec<Result<Classification, ClassifyError>> {
        let embeddings = match self.embed_all(titles).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                return titles
                    .iter()
                    .map(|title| Err(failure(title, e.clone(), None)))
                    .collect();
            }
        };
        debug!(count = titles.len(), "embedded batch");

        let mut results = Vec::with_capacity(titles.len());
        for (title, embedding) in titles.iter().zip(&embeddings) {
            results.push(self.commit(title, embedding).await);
        }
        results
    }

    /// Current buckets in insertion order.
    pub async fn list(&self) -> Result<Vec<Bucket>, BucketError> {
        let (set, _) = self.load().await?;
        Ok(set.buckets)
    }

    /// Load, match and conditionally save until the write lands or retries
    /// run out.
    async fn commit(&self, title: &str, embedding: &[f32]) -> Result<Classification, ClassifyError> {
        let mut retries = 0;
        loop {
            let (mut set, version) = self.load().await.map_err(|e| failure(title, e, None))?;
            match set.dimension() {
                Some(expected) if expected != embedding.len() => {
                    let err = BucketError::DimensionMismatch {
                        expected,
                        got: embedding.len(),
                    };
                    return Err(failure(title, err, None));
                }
                _ => {}
            }

            let assignment = self.policy.assign(title, embedding, &mut set, Utc::now());
            let result = classification(
                &set.buckets[assignment.index],
                assignment.confidence,
                assignment.created(),
            );
            debug!(
                title,
                bucket = %result.bucket_id,
                outcome = ?assignment.outcome,
                confidence = ?result.confidence,
                "matched"
            );
            if !assignment.mutated() {
                return Ok(result);
            }

            match self.save(&set, &version).await {
                Ok(new_version) => {
                    if result.created {
                        info!(title, bucket = %result.bucket_id, version = %new_version, "bucket created");
                    } else {
                        debug!(title, bucket = %result.bucket_id, version = %new_version, "committed");
                    }
                    return Ok(result);
                }
                Err(BucketError::StoreConflict(reason)) if retries < self.max_retries => {
                    retries += 1;
                    warn!(title, retries, %version, "save conflict, reloading: {reason}");
                }
                Err(BucketError::StoreConflict(reason)) => {
                    let err = BucketError::StoreConflict(format!(
                        "{reason} (gave up after {retries} retries)"
                    ));
                    return Err(failure(title, err, Some(result.bucket_id)));
                }
                Err(e) => return Err(failure(title, e, Some(result.bucket_id))),
            }
        }
    }

    async fn embed(&self, title: &str) -> Result<Vec<f32>, BucketError> {
        if normalize(title).is_empty() {
            return self.blank_embedding();
        }
        let embedding = self
            .timed("embed", BucketError::EmbeddingUnavailable, async {
                self.embedder.embed(title).await.map_err(BucketError::from)
            })
            .await?;
        if embedding.is_empty() {
            return Err(BucketError::EmbeddingUnavailable(
                "provider returned an empty vector".into(),
            ));
        }
        Ok(embedding)
    }

    async fn embed_all(&self, titles: &[&str]) -> Result<Vec<Vec<f32>>, BucketError> {
        let texts: Vec<&str> = titles
            .iter()
            .copied()
            .filter(|title| !normalize(title).is_empty())
            .collect();
        let provided = if texts.is_empty() {
            Vec::new()
        } else {
            self.timed("embed", BucketError::EmbeddingUnavailable, async {
                self.embedder
                    .embed_batch(&texts)
                    .await
                    .map_err(BucketError::from)
            })
            .await?
        };
        if provided.len() != texts.len() {
            return Err(BucketError::EmbeddingUnavailable(format!(
                "provider returned {} vectors for {} texts",
                provided.len(),
                texts.len()
            )));
        }

        let mut provided = provided.into_iter();
        let mut embeddings = Vec::with_capacity(titles.len());
        for title in titles {
            if normalize(title).is_empty() {
                embeddings.push(self.blank_embedding()?);
                continue;
            }
            let embedding = provided.next().unwrap_or_default();
            if embedding.is_empty() {
                return Err(BucketError::EmbeddingUnavailable(
                    "provider returned an empty vector".into(),
                ));
            }
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    /// Zero vector used for titles with no characters to embed.
    fn blank_embedding(&self) -> Result<Vec<f32>, BucketError> {
        match self.embedder.dimension() {
            0 => Err(BucketError::EmbeddingUnavailable(
                "provider dimension unknown, cannot place a blank title".into(),
            )),
            dim => Ok(vec![0.0; dim]),
        }
    }

    async fn load(&self) -> Result<(BucketSet, Version), BucketError> {
        self.timed("load", BucketError::StoreUnavailable, self.store.load())
            .await
    }

    async fn save(&self, set: &BucketSet, expected: &Version) -> Result<Version, BucketError> {
        let Some(limit) = self.timeout else {
            return self.store.save(set, expected).await;
        };
        match tokio::time::timeout(limit, self.store.save(set, expected)).await {
            Ok(result) => result,
            Err(_) => {
                // The request may have reached the store before the deadline.
                warn!(%expected, "save timed out after {limit:?}, checking whether it landed");
                match self.load().await {
                    Ok((current, version)) if landed(&current, set) => Ok(version),
                    _ => Err(BucketError::StoreUnavailable(format!(
                        "save timed out after {limit:?}"
                    ))),
                }
            }
        }
    }

    async fn timed<T, F>(
        &self,
        step: &str,
        on_timeout: fn(String) -> BucketError,
        fut: F,
    ) -> Result<T, BucketError>
    where
        F: Future<Output = Result<T, BucketError>>,
    {
        let Some(limit) = self.timeout else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!("{step} timed out after {limit:?}"))),
        }
    }
}

fn failure(title: &str, source: BucketError, bucket: Option<String>) -> ClassifyError {
    ClassifyError {
        title: title.to_string(),
        bucket,
        source,
    }
}

/// A save commits `attempted` at the next revision, so the store holding
/// exactly that content one revision on means the write went through.
fn landed(current: &BucketSet, attempted: &BucketSet) -> bool {
    current.revision == attempted.revision + 1 && current.buckets == attempted.buckets
}

fn classification(bucket: &Bucket, confidence: Option<f32>, created: bool) -> Classification {
    Classification {
        bucket_id: bucket.id.clone(),
        label: bucket.canonical_label.clone(),
        confidence,
        created,
    }
}

#[cfg(test)]
mod tests {
    use tzun_embed::HashEmbedder;
    use tzun_kv::MemoryStore;

    use super::*;
    use crate::store::KvBucketStore;

    fn classifier(cfg: ClassifierConfig) -> Classifier {
        let store = KvBucketStore::new(Arc::new(MemoryStore::new()), "test");
        Classifier::new(cfg, Arc::new(HashEmbedder::default()), Arc::new(store))
    }

    #[test]
    fn classifier_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Classifier>();
    }

    #[test]
    fn config_defaults() {
        let cfg = ClassifierConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.id_prefix, "bucket");
        assert_eq!(cfg.strategy, Strategy::similarity(0.8));
        assert!(cfg.timeout.is_none());
    }

    #[tokio::test]
    async fn exact_duplicate_is_idempotent() {
        let c = classifier(ClassifierConfig::default());
        let first = c.classify("Staff Data Engineer").await.unwrap();
        assert!(first.created);
        assert_eq!(first.confidence, None);
        assert_eq!(first.bucket_id, "bucket:001");

        let second = c.classify("Staff Data Engineer").await.unwrap();
        assert!(!second.created);
        assert_eq!(second.bucket_id, first.bucket_id);
        assert!((second.confidence.unwrap() - 1.0).abs() < 1e-6);

        let buckets = c.list().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].match_count, 2);
    }

    #[tokio::test]
    async fn empty_title_is_legal() {
        let c = classifier(ClassifierConfig {
            strategy: Strategy::ExactKey,
            ..Default::default()
        });
        let a = c.classify("   ").await.unwrap();
        let b = c.classify("").await.unwrap();
        assert_eq!(a.bucket_id, b.bucket_id);
        assert_eq!(b.confidence, Some(1.0));
        assert_eq!(c.list().await.unwrap()[0].normalized_key, "");
    }

    #[tokio::test]
    async fn blank_titles_share_one_bucket_by_similarity() {
        let c = classifier(ClassifierConfig::default());
        let first = c.classify("").await.unwrap();
        let second = c.classify("").await.unwrap();
        let third = c.classify("   ").await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert!(!third.created);
        assert_eq!(second.bucket_id, first.bucket_id);
        assert_eq!(third.bucket_id, first.bucket_id);
        assert_eq!(second.confidence, Some(1.0));

        let buckets = c.list().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].match_count, 3);
        assert_eq!(
            buckets[0].representative_embedding.len(),
            HashEmbedder::default().dimension()
        );
    }

    #[tokio::test]
    async fn batch_follows_input_order() {
        let c = classifier(ClassifierConfig::default());
        let results: Vec<_> = c
            .classify_batch(&["Staff Data Engineer", "", "Staff Data Engineer"])
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].created);
        assert!(results[1].created);
        assert!(!results[2].created);
        assert_eq!(results[2].bucket_id, results[0].bucket_id);
        assert_ne!(results[1].bucket_id, results[0].bucket_id);
        assert_eq!(c.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_touches_nothing() {
        let c = classifier(ClassifierConfig::default());
        assert!(c.classify_batch(&[]).await.is_empty());
        assert!(c.list().await.unwrap().is_empty());
    }
}
