use thiserror::Error;
use tzun_embed::EmbedError;
use tzun_kv::KvError;

/// Errors returned by bucket stores and the assignment pipeline.
#[derive(Debug, Clone, Error)]
pub enum BucketError {
    #[error("bucket: embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("bucket: store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("bucket: store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("bucket: store conflict: {0}")]
    StoreConflict(String),

    #[error("bucket: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl BucketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::StoreCorrupt(_) => ErrorKind::StoreCorrupt,
            Self::StoreConflict(_) => ErrorKind::StoreConflict,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
        }
    }
}

impl From<KvError> for BucketError {
    fn from(e: KvError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<EmbedError> for BucketError {
    fn from(e: EmbedError) -> Self {
        Self::EmbeddingUnavailable(e.to_string())
    }
}

/// Discriminant of a [`BucketError`], for callers that branch on the
/// failure class without matching the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmbeddingUnavailable,
    StoreUnavailable,
    StoreCorrupt,
    StoreConflict,
    DimensionMismatch,
}

/// A failed [`crate::Classifier::classify`] call.
///
/// Carries the title being classified and, when the failure happened after
/// matching, the id of the bucket the title was about to join or create.
#[derive(Debug, Error)]
#[error("classify {title:?}: {source}")]
pub struct ClassifyError {
    pub title: String,
    pub bucket: Option<String>,
    #[source]
    pub source: BucketError,
}

impl ClassifyError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_errors_map_to_unavailable() {
        let err: BucketError = KvError::Storage("disk gone".into()).into();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.to_string().contains("disk gone"));
    }

    #[test]
    fn embed_errors_map_to_embedding_unavailable() {
        let err: BucketError = EmbedError::EmptyInput.into();
        assert_eq!(err.kind(), ErrorKind::EmbeddingUnavailable);
    }

    #[test]
    fn classify_error_display() {
        let err = ClassifyError {
            title: "Sr. Engineer".into(),
            bucket: Some("bucket:002".into()),
            source: BucketError::StoreConflict("revision moved".into()),
        };
        assert_eq!(err.kind(), ErrorKind::StoreConflict);
        assert_eq!(
            err.to_string(),
            "classify \"Sr. Engineer\": bucket: store conflict: revision moved"
        );
    }
}
