//! Decides, for one label, whether it joins an existing bucket or founds a
//! new one, and applies that decision to a loaded [`BucketSet`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::matcher::{Match, best_match};
use crate::types::{Bucket, BucketSet};

/// Default minimum cosine similarity for joining a bucket.
pub const DEFAULT_THRESHOLD: f32 = 0.8;

/// Default id prefix ("bucket" -> "bucket:001").
pub const DEFAULT_ID_PREFIX: &str = "bucket";

/// How labels are matched to buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Match on the normalized label only. Hits never mutate the bucket.
    ExactKey,

    /// Match on embedding similarity against each bucket representative.
    Similarity {
        /// Inclusive lower bound on cosine similarity.
        #[serde(default = "default_threshold")]
        threshold: f32,

        /// Move the representative to the running mean of its members on
        /// every match. Off by default: the creating label stays canonical.
        #[serde(default)]
        update_centroid: bool,
    },
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl Strategy {
    pub fn similarity(threshold: f32) -> Self {
        Self::Similarity {
            threshold,
            update_centroid: false,
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::similarity(DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new bucket was appended.
    Created,
    /// An existing bucket absorbed the label.
    Matched,
    /// An existing bucket was returned as is.
    Unchanged,
}

/// What [`AssignPolicy::assign`] did to the set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    /// Index of the resolved bucket in `set.buckets`.
    pub index: usize,
    pub confidence: Option<f32>,
    pub outcome: Outcome,
}

impl Assignment {
    /// Whether the set changed and needs to be saved.
    pub fn mutated(&self) -> bool {
        self.outcome != Outcome::Unchanged
    }

    pub fn created(&self) -> bool {
        self.outcome == Outcome::Created
    }
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Comparison key for a label. Never used for display.
pub fn normalize(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Bucket assignment rules.
#[derive(Debug, Clone)]
pub struct AssignPolicy {
    pub strategy: Strategy,

    /// Maximum number of examples recorded per bucket. Once reached, later
    /// members are counted but not recorded.
    pub max_examples: Option<usize>,

    /// Prepended to generated ids. Empty means bare numbers ("001").
    pub id_prefix: String,
}

impl Default for AssignPolicy {
    fn default() -> Self {
        Self::new(Strategy::default())
    }
}

impl AssignPolicy {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            max_examples: None,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }

    pub fn with_max_examples(mut self, max: usize) -> Self {
        self.max_examples = Some(max);
        self
    }

    pub fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_prefix = prefix.to_string();
        self
    }

    /// Resolves `title` against `set`, creating or updating a bucket in
    /// place. The caller persists the set when [`Assignment::mutated`].
    pub fn assign(
        &self,
        title: &str,
        embedding: &[f32],
        set: &mut BucketSet,
        now: DateTime<Utc>,
    ) -> Assignment {
        let key = normalize(title);
        match self.strategy {
            Strategy::ExactKey => match set.find_by_key(&key) {
                Some(index) => Assignment {
                    index,
                    confidence: Some(1.0),
                    outcome: Outcome::Unchanged,
                },
                None => self.create(title, key, embedding, set, now),
            },
            Strategy::Similarity {
                threshold,
                update_centroid,
            } => {
                // A blank label or a zero vector scores 0.0 against every
                // bucket, including its own earlier copy, so it resolves by key.
                let degenerate = key.is_empty() || is_zero(embedding);
                let found = if degenerate {
                    set.find_by_key(&key).map(|index| Match { index, score: 1.0 })
                } else {
                    None
                };
                let found = found.or_else(|| {
                    best_match(embedding, &set.buckets).filter(|m| m.score >= threshold)
                });
                match found {
                    Some(m) => {
                        let bucket = &mut set.buckets[m.index];
                        let move_centroid = update_centroid && !is_zero(embedding);
                        self.absorb(bucket, title, embedding, move_centroid, now);
                        Assignment {
                            index: m.index,
                            confidence: Some(m.score),
                            outcome: Outcome::Matched,
                        }
                    }
                    None => self.create(title, key, embedding, set, now),
                }
            }
        }
    }

    fn create(
        &self,
        title: &str,
        key: String,
        embedding: &[f32],
        set: &mut BucketSet,
        now: DateTime<Utc>,
    ) -> Assignment {
        let id = self.next_id(set);
        set.buckets
            .push(Bucket::new(id, title, key, embedding.to_vec(), now));
        Assignment {
            index: set.buckets.len() - 1,
            confidence: None,
            outcome: Outcome::Created,
        }
    }

    fn absorb(
        &self,
        bucket: &mut Bucket,
        title: &str,
        embedding: &[f32],
        update_centroid: bool,
        now: DateTime<Utc>,
    ) {
        if update_centroid {
            // Running mean over match_count members plus this one.
            let n = bucket.match_count.max(1) as f64;
            for (c, x) in bucket.representative_embedding.iter_mut().zip(embedding) {
                let mean = (*c as f64 * n + *x as f64) / (n + 1.0);
                *c = mean as f32;
            }
        }
        if self.max_examples.is_none_or(|max| bucket.examples.len() < max) {
            bucket.examples.push(title.to_string());
        }
        bucket.match_count += 1;
        bucket.updated_at = now;
    }

    /// Next free id: position-based, bumped past any id already taken.
    fn next_id(&self, set: &BucketSet) -> String {
        let mut n = set.len() + 1;
        loop {
            let id = if self.id_prefix.is_empty() {
                format!("{n:03}")
            } else {
                format!("{}:{n:03}", self.id_prefix)
            };
            if set.get(&id).is_none() {
                return id;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn similarity(threshold: f32) -> AssignPolicy {
        AssignPolicy::new(Strategy::similarity(threshold))
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Senior ENGINEER \t"), "senior engineer");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn bootstrap_creates_first_bucket() {
        let policy = similarity(0.8);
        let mut set = BucketSet::new();
        let a = policy.assign("Engineer", &[1.0, 0.0], &mut set, Utc::now());
        assert_eq!(a.outcome, Outcome::Created);
        assert_eq!(a.index, 0);
        assert_eq!(a.confidence, None);
        assert!(a.mutated());
        assert_eq!(set.buckets[0].id, "bucket:001");
        assert_eq!(set.buckets[0].match_count, 1);
    }

    #[test]
    fn threshold_is_inclusive() {
        // cos((4,3), (1,0)) == 0.8 exactly
        let policy = similarity(0.8);
        let mut set = BucketSet::new();
        policy.assign("A", &[1.0, 0.0], &mut set, Utc::now());
        let a = policy.assign("B", &[4.0, 3.0], &mut set, Utc::now());
        assert_eq!(a.outcome, Outcome::Matched);
        assert_eq!(a.confidence, Some(0.8));
        assert_eq!(set.len(), 1);
        assert_eq!(set.buckets[0].examples, vec!["A", "B"]);
        assert_eq!(set.buckets[0].match_count, 2);
    }

    #[test]
    fn just_below_threshold_creates() {
        let above = f32::from_bits(0.8f32.to_bits() + 1);
        let policy = similarity(above);
        let mut set = BucketSet::new();
        policy.assign("A", &[1.0, 0.0], &mut set, Utc::now());
        let a = policy.assign("B", &[4.0, 3.0], &mut set, Utc::now());
        assert_eq!(a.outcome, Outcome::Created);
        assert_eq!(set.len(), 2);
        assert_eq!(set.buckets[1].id, "bucket:002");
    }

    #[test]
    fn match_refreshes_updated_at_only() {
        let policy = similarity(0.5);
        let mut set = BucketSet::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        policy.assign("A", &[1.0, 0.0], &mut set, t0);
        policy.assign("a", &[1.0, 0.1], &mut set, t1);
        let b = &set.buckets[0];
        assert_eq!(b.created_at, t0);
        assert_eq!(b.updated_at, t1);
        assert_eq!(b.canonical_label, "A");
        assert_eq!(b.representative_embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn exact_key_hits_without_mutation() {
        let policy = AssignPolicy::new(Strategy::ExactKey);
        let mut set = BucketSet::new();
        policy.assign("Data Scientist", &[0.2, 0.9], &mut set, Utc::now());
        let before = set.clone();
        let a = policy.assign("  data scientist ", &[0.0, 1.0], &mut set, Utc::now());
        assert_eq!(a.outcome, Outcome::Unchanged);
        assert_eq!(a.confidence, Some(1.0));
        assert!(!a.mutated());
        assert_eq!(set, before);
    }

    #[test]
    fn exact_key_miss_creates_even_if_similar() {
        let policy = AssignPolicy::new(Strategy::ExactKey);
        let mut set = BucketSet::new();
        policy.assign("Engineer", &[1.0, 0.0], &mut set, Utc::now());
        let a = policy.assign("Engineers", &[1.0, 0.0], &mut set, Utc::now());
        assert!(a.created());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn blank_titles_share_one_bucket() {
        let policy = similarity(0.8);
        let mut set = BucketSet::new();
        let zero = [0.0, 0.0];
        let a = policy.assign("", &zero, &mut set, Utc::now());
        let b = policy.assign("", &zero, &mut set, Utc::now());
        let c = policy.assign("   ", &zero, &mut set, Utc::now());
        assert!(a.created());
        assert_eq!(b.outcome, Outcome::Matched);
        assert_eq!(b.confidence, Some(1.0));
        assert_eq!(c.index, a.index);
        assert_eq!(set.len(), 1);
        assert_eq!(set.buckets[0].examples, vec!["", "", "   "]);
        assert_eq!(set.buckets[0].match_count, 3);
    }

    #[test]
    fn zero_vector_resolves_by_key() {
        let policy = AssignPolicy::new(Strategy::Similarity {
            threshold: 0.8,
            update_centroid: true,
        });
        let mut set = BucketSet::new();
        policy.assign("Engineer", &[1.0, 0.0], &mut set, Utc::now());
        policy.assign("???", &[0.0, 0.0], &mut set, Utc::now());
        let again = policy.assign("???", &[0.0, 0.0], &mut set, Utc::now());
        assert_eq!(set.len(), 2);
        assert_eq!(again.index, 1);
        assert_eq!(again.confidence, Some(1.0));
        // Zero vectors never pull a centroid.
        assert_eq!(set.buckets[1].representative_embedding, vec![0.0, 0.0]);

        // Unknown key with a zero vector still founds its own bucket.
        let other = policy.assign("!!!", &[0.0, 0.0], &mut set, Utc::now());
        assert!(other.created());
    }

    #[test]
    fn examples_cap_keeps_earliest() {
        let policy = similarity(0.5).with_max_examples(2);
        let mut set = BucketSet::new();
        for title in ["one", "two", "three", "four"] {
            policy.assign(title, &[1.0, 0.0], &mut set, Utc::now());
        }
        let b = &set.buckets[0];
        assert_eq!(b.examples, vec!["one", "two"]);
        assert_eq!(b.match_count, 4);
    }

    #[test]
    fn centroid_running_mean() {
        let policy = AssignPolicy::new(Strategy::Similarity {
            threshold: 0.0,
            update_centroid: true,
        });
        let mut set = BucketSet::new();
        policy.assign("a", &[1.0, 0.0], &mut set, Utc::now());
        policy.assign("b", &[0.0, 1.0], &mut set, Utc::now());
        assert_eq!(set.buckets[0].representative_embedding, vec![0.5, 0.5]);
        policy.assign("c", &[1.0, 1.0], &mut set, Utc::now());
        let c = &set.buckets[0].representative_embedding;
        assert!((c[0] - 2.0 / 3.0).abs() < 1e-6);
        assert!((c[1] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn greedy_assignment_is_not_transitive() {
        // a and c are 60 degrees apart, each 30 degrees from b.
        let (s, c) = (30f32.to_radians().sin(), 30f32.to_radians().cos());
        let policy = similarity(0.8);
        let mut set = BucketSet::new();
        policy.assign("B", &[1.0, 0.0], &mut set, Utc::now());
        policy.assign("A", &[c, s], &mut set, Utc::now());
        policy.assign("C", &[c, -s], &mut set, Utc::now());
        assert_eq!(set.len(), 1);
        assert_eq!(set.buckets[0].examples, vec!["B", "A", "C"]);

        // Seeded with A instead, C lands in its own bucket.
        let mut set = BucketSet::new();
        policy.assign("A", &[c, s], &mut set, Utc::now());
        policy.assign("C", &[c, -s], &mut set, Utc::now());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn ids_skip_taken_numbers() {
        let policy = AssignPolicy::new(Strategy::ExactKey).with_id_prefix("title");
        let mut set = BucketSet::new();
        set.buckets.push(Bucket::new(
            "title:001".into(),
            "x",
            "x".into(),
            vec![1.0],
            Utc::now(),
        ));
        set.buckets.push(Bucket::new(
            "title:003".into(),
            "y",
            "y".into(),
            vec![1.0],
            Utc::now(),
        ));
        let a = policy.assign("z", &[1.0], &mut set, Utc::now());
        assert_eq!(set.buckets[a.index].id, "title:004");

        let bare = AssignPolicy::new(Strategy::ExactKey).with_id_prefix("");
        let mut set = BucketSet::new();
        bare.assign("z", &[1.0], &mut set, Utc::now());
        assert_eq!(set.buckets[0].id, "001");
    }

    #[test]
    fn strategy_serde() {
        let s: Strategy = serde_json::from_str(r#"{"kind":"similarity"}"#).unwrap();
        assert_eq!(s, Strategy::default());
        let s: Strategy =
            serde_json::from_str(r#"{"kind":"similarity","threshold":0.9,"update_centroid":true}"#)
                .unwrap();
        assert_eq!(
            s,
            Strategy::Similarity {
                threshold: 0.9,
                update_centroid: true
            }
        );
        let s: Strategy = serde_json::from_str(r#"{"kind":"exact_key"}"#).unwrap();
        assert_eq!(s, Strategy::ExactKey);
    }
}
