//! Incremental, unsupervised bucketing of free-text labels.
//!
//! Every label (typically a job title) is embedded, compared against the
//! representative vector of each existing bucket and either joins the best
//! bucket or founds a new one. Bucket state lives in a versioned store and
//! every write is conditional, so concurrent classifiers, in one process or
//! many, never lose each other's buckets.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tzun_bucket::{Classifier, ClassifierConfig, KvBucketStore};
//! use tzun_embed::HashEmbedder;
//! use tzun_kv::MemoryStore;
//!
//! # async fn run() -> Result<(), tzun_bucket::ClassifyError> {
//! let store = Arc::new(KvBucketStore::new(Arc::new(MemoryStore::new()), "titles"));
//! let classifier = Classifier::new(
//!     ClassifierConfig::default(),
//!     Arc::new(HashEmbedder::default()),
//!     store,
//! );
//!
//! let first = classifier.classify("Senior Software Engineer").await?;
//! assert!(first.created);
//! assert_eq!(first.confidence, None);
//! # Ok(())
//! # }
//! ```
//!
//! # Design
//!
//! Assignment is greedy and online: the first label of a cluster becomes its
//! representative and, by default, stays so forever. Results therefore depend
//! on arrival order and similarity is not transitive across a bucket (A and
//! C may both join B without being similar to each other). Buckets are never
//! merged, split or deleted after the fact.

mod classifier;
mod cosine;
mod error;
mod matcher;
mod policy;
mod store;
mod types;

pub use classifier::{Classifier, ClassifierConfig, DEFAULT_MAX_RETRIES};
pub use cosine::cosine_similarity;
pub use error::{BucketError, ClassifyError, ErrorKind};
pub use matcher::{Match, best_match};
pub use policy::{
    AssignPolicy, Assignment, DEFAULT_ID_PREFIX, DEFAULT_THRESHOLD, Outcome, Strategy, normalize,
};
pub use store::{BucketStore, GithubBucketStore, GithubConfig, KvBucketStore};
pub use types::{Bucket, BucketSet, Classification, Version};
