//! Text embedding providers.
//!
//! [`Embedder`] turns text into a fixed-length `f32` vector. Two families of
//! implementations are provided:
//!
//! - [`OpenAICompat`]: any OpenAI-compatible `/embeddings` endpoint, with
//!   presets for OpenAI and DashScope.
//! - [`HashEmbedder`]: a deterministic, offline embedder built from hashed
//!   character trigrams and words. Good enough to group near-identical
//!   labels; not a semantic model.

pub mod config;
pub mod embed;
pub mod error;
pub mod hash;
pub mod openai;

pub use config::EmbedConfig;
pub use embed::Embedder;
pub use error::EmbedError;
pub use hash::HashEmbedder;
pub use openai::{OpenAICompat, Provider};
