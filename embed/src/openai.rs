use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EmbedConfig;
use crate::embed::Embedder;
use crate::error::EmbedError;

/// OpenAI embedding models.
pub const MODEL_OPENAI_3_SMALL: &str = "text-embedding-3-small";
pub const MODEL_OPENAI_3_LARGE: &str = "text-embedding-3-large";

/// DashScope embedding models.
pub const MODEL_DASHSCOPE_V4: &str = "text-embedding-v4";
pub const MODEL_DASHSCOPE_V3: &str = "text-embedding-v3";

const MAX_ATTEMPTS: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Known OpenAI-compatible embedding providers.
///
/// They share one request/response format; only the base URL, default model,
/// default dimension and maximum batch size differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    /// Aliyun DashScope's OpenAI-compatible mode.
    DashScope,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::DashScope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAI => MODEL_OPENAI_3_SMALL,
            Provider::DashScope => MODEL_DASHSCOPE_V4,
        }
    }

    pub fn default_dimension(self) -> usize {
        match self {
            Provider::OpenAI => 1536,
            Provider::DashScope => 1024,
        }
    }

    pub fn max_batch(self) -> usize {
        match self {
            Provider::OpenAI => 2048,
            Provider::DashScope => 10,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f64>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// Embedder for OpenAI-compatible `/embeddings` endpoints.
///
/// Retries rate limits (429), server errors and transport failures with
/// exponential backoff before giving up.
pub struct OpenAICompat {
    client: Client,
    provider: Provider,
    api_key: String,
    model: String,
    dim: usize,
    base_url: String,
}

impl OpenAICompat {
    /// Create an embedder with the provider's defaults.
    pub fn new(provider: Provider, api_key: &str) -> Result<Self, EmbedError> {
        Self::with_config(provider, api_key, EmbedConfig::default())
    }

    pub fn with_config(
        provider: Provider,
        api_key: &str,
        cfg: EmbedConfig,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(cfg.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(Self {
            client,
            provider,
            api_key: api_key.to_string(),
            model: if cfg.model.is_empty() {
                provider.default_model().to_string()
            } else {
                cfg.model
            },
            dim: if cfg.dimension == 0 {
                provider.default_dimension()
            } else {
                cfg.dimension
            },
            base_url: if cfg.base_url.is_empty() {
                provider.base_url().to_string()
            } else {
                cfg.base_url
            },
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_with_retry(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_api(texts).await {
                Ok(vecs) => return Ok(vecs),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    // 500ms, 1s, ...
                    let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "embedding call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_api(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dim,
            encoding_format: "float",
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EmbedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let data: EmbeddingResponse = resp.json().await?;
        debug!(
            provider = ?self.provider,
            model = %self.model,
            count = data.data.len(),
            "embedding call succeeded"
        );
        reassemble(data.data, texts.len())
    }
}

/// Put embeddings back in request order; the API may return them shuffled.
fn reassemble(items: Vec<EmbeddingData>, batch_size: usize) -> Result<Vec<Vec<f32>>, EmbedError> {
    let mut vecs: Vec<Option<Vec<f32>>> = vec![None; batch_size];
    for item in items {
        if item.index >= batch_size {
            return Err(EmbedError::UnexpectedIndex {
                index: item.index,
                batch_size,
            });
        }
        vecs[item.index] = Some(item.embedding.iter().map(|&v| v as f32).collect());
    }

    vecs.into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or(EmbedError::MissingIndex(i)))
        .collect()
}

#[async_trait::async_trait]
impl Embedder for OpenAICompat {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or(EmbedError::MissingIndex(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let mut result = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.provider.max_batch()) {
            result.extend(self.call_with_retry(chunk).await?);
        }
        Ok(result)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}
