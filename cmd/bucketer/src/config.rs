//! Configuration loading and component wiring.
//!
//! Configuration is stored in ~/.tzun/bucketer/config.yaml (JSON also
//! accepted by extension). A missing default file means "all defaults":
//! a local redb store and the OpenAI embedder.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tzun_bucket::{
    BucketStore, ClassifierConfig, DEFAULT_ID_PREFIX, DEFAULT_MAX_RETRIES, GithubBucketStore,
    GithubConfig, KvBucketStore, Strategy,
};
use tzun_embed::hash::DEFAULT_HASH_DIM;
use tzun_embed::{EmbedConfig, Embedder, HashEmbedder, OpenAICompat, Provider};
use tzun_kv::RedbStore;

pub const DEFAULT_BASE_DIR: &str = ".tzun";
pub const APP_NAME: &str = "bucketer";
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_REDB_FILE: &str = "buckets.redb";
pub const DEFAULT_KV_PREFIX: &str = "titles";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub embedder: EmbedderConfig,
    pub classifier: ClassifierSection,
}

/// Where buckets are persisted.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Redb {
        /// Database file (default ~/.tzun/bucketer/buckets.redb).
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default = "default_kv_prefix")]
        prefix: String,
    },
    Github {
        /// "owner/name".
        repo: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        branch: Option<String>,
        /// Literal token or `$VAR` (default `$GITHUB_TOKEN`).
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        api_url: Option<String>,
        #[serde(default)]
        commit_message: Option<String>,
    },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Redb {
            path: None,
            prefix: default_kv_prefix(),
        }
    }
}

fn default_kv_prefix() -> String {
    DEFAULT_KV_PREFIX.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    #[default]
    Openai,
    Dashscope,
    /// Local hashing embedder; needs no network.
    Hash,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub kind: EmbedderKind,
    /// Literal key or `$VAR` (default `$OPENAI_API_KEY` / `$DASHSCOPE_API_KEY`).
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClassifierSection {
    pub strategy: Strategy,
    pub max_retries: usize,
    pub max_examples: Option<usize>,
    pub id_prefix: String,
    pub timeout_secs: Option<u64>,
}

impl Default for ClassifierSection {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_examples: None,
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
            timeout_secs: None,
        }
    }
}

impl Config {
    /// Gets the default config directory (~/.tzun/bucketer).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_BASE_DIR).join(APP_NAME))
    }

    /// Loads `path`, or the default config file when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load_file(Path::new(p)),
            None => match Self::default_dir().map(|d| d.join(DEFAULT_CONFIG_FILE)) {
                Some(p) if p.exists() => Self::load_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_slice(&data)
                .with_context(|| format!("parse config {}", path.display()))?,
            _ => serde_yaml::from_slice(&data)
                .with_context(|| format!("parse config {}", path.display()))?,
        };
        Ok(cfg)
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        let c = &self.classifier;
        ClassifierConfig {
            strategy: c.strategy,
            max_retries: c.max_retries,
            max_examples: c.max_examples,
            id_prefix: c.id_prefix.clone(),
            timeout: c.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn build_store(&self) -> Result<Arc<dyn BucketStore>> {
        match &self.store {
            StoreConfig::Redb { path, prefix } => {
                let path = match path {
                    Some(p) => p.clone(),
                    None => Self::default_dir()
                        .context("could not find home directory")?
                        .join(DEFAULT_REDB_FILE),
                };
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("create {}", dir.display()))?;
                }
                let kv = RedbStore::open(&path)
                    .with_context(|| format!("open {}", path.display()))?;
                Ok(Arc::new(KvBucketStore::new(Arc::new(kv), prefix)))
            }
            StoreConfig::Github {
                repo,
                path,
                branch,
                token,
                api_url,
                commit_message,
            } => {
                let token = expand_env(token.as_deref().unwrap_or("$GITHUB_TOKEN"));
                if token.is_empty() {
                    anyhow::bail!("github store needs a token (set store.token or $GITHUB_TOKEN)");
                }
                let mut cfg = GithubConfig::new(&token, repo);
                if let Some(p) = path {
                    cfg = cfg.with_path(p);
                }
                if let Some(b) = branch {
                    cfg = cfg.with_branch(b);
                }
                if let Some(u) = api_url {
                    cfg = cfg.with_api_url(u);
                }
                if let Some(m) = commit_message {
                    cfg = cfg.with_commit_message(m);
                }
                Ok(Arc::new(GithubBucketStore::new(cfg)?))
            }
        }
    }

    pub fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let e = &self.embedder;
        let provider = match e.kind {
            EmbedderKind::Hash => {
                let dim = e.dimension.unwrap_or(DEFAULT_HASH_DIM);
                return Ok(Arc::new(HashEmbedder::new(dim)));
            }
            EmbedderKind::Openai => Provider::OpenAI,
            EmbedderKind::Dashscope => Provider::DashScope,
        };

        let default_key = match provider {
            Provider::OpenAI => "$OPENAI_API_KEY",
            Provider::DashScope => "$DASHSCOPE_API_KEY",
        };
        let raw_key = e.api_key.as_deref().unwrap_or(default_key);
        let api_key = expand_env(raw_key);
        if api_key.is_empty() {
            anyhow::bail!("embedder api_key '{raw_key}' resolved to empty (env var not set?)");
        }

        let mut cfg = EmbedConfig::default();
        if let Some(model) = &e.model {
            cfg = cfg.with_model(model);
        }
        if let Some(dim) = e.dimension {
            cfg = cfg.with_dimension(dim);
        }
        if let Some(url) = &e.base_url {
            cfg = cfg.with_base_url(url);
        }
        if let Some(secs) = e.timeout_secs {
            cfg = cfg.with_timeout(Duration::from_secs(secs));
        }
        Ok(Arc::new(OpenAICompat::with_config(provider, &api_key, cfg)?))
    }
}

/// Expands a whole-value `$VAR` or `${VAR}` reference. Anything else is
/// returned as is; an unset variable expands to "".
fn expand_env(s: &str) -> String {
    let Some(rest) = s.strip_prefix('$') else {
        return s.to_string();
    };
    let name = rest
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .unwrap_or(rest);
    std::env::var(name).unwrap_or_default()
}
