use std::time::Duration;

/// Builder-style overrides for [`crate::OpenAICompat`].
///
/// Empty strings and zero values mean "use the provider default".
#[derive(Debug, Clone, Default)]
pub struct EmbedConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: String,
    pub timeout: Option<Duration>,
}

impl EmbedConfig {
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.dimension = dim;
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
