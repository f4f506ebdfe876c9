use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embed: empty input")]
    EmptyInput,

    #[error("embed: HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embed: API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embed: missing embedding for index {0}")]
    MissingIndex(usize),

    #[error("embed: unexpected embedding index {index} for batch size {batch_size}")]
    UnexpectedIndex { index: usize, batch_size: usize },
}

impl EmbedError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbedError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EmbedError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
