use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BucketStore, Document};
use crate::error::BucketError;
use crate::types::{BucketSet, Version};

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_PATH: &str = "buckets.json";
pub const DEFAULT_GITHUB_BRANCH: &str = "main";
pub const DEFAULT_COMMIT_MESSAGE: &str = "chore: update dynamic buckets";

const USER_AGENT: &str = "tzun-bucketer";
const API_VERSION: &str = "2022-11-28";

/// Where and how the bucket document is committed.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    /// "owner/name".
    pub repo: String,
    /// File path inside the repository.
    pub path: String,
    pub branch: String,
    pub api_url: String,
    pub commit_message: String,
}

impl GithubConfig {
    pub fn new(token: &str, repo: &str) -> Self {
        Self {
            token: token.to_string(),
            repo: repo.to_string(),
            path: DEFAULT_GITHUB_PATH.to_string(),
            branch: DEFAULT_GITHUB_BRANCH.to_string(),
            api_url: DEFAULT_GITHUB_API.to_string(),
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.trim_start_matches('/').to_string();
        self
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    pub fn with_api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_commit_message(mut self, message: &str) -> Self {
        self.commit_message = message.to_string();
        self
    }
}

/// [`BucketStore`] that keeps the set as a pretty-printed JSON file in a
/// GitHub repository, written through the contents API.
///
/// The file's blob SHA is the version token: GitHub rejects an update whose
/// `sha` is not the current one.
pub struct GithubBucketStore {
    client: Client,
    cfg: GithubConfig,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    branch: &'a str,
}

#[derive(Deserialize)]
struct UpdateResponse {
    content: UpdatedContent,
}

#[derive(Deserialize)]
struct UpdatedContent {
    sha: String,
}

impl GithubBucketStore {
    pub fn new(cfg: GithubConfig) -> Result<Self, BucketError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BucketError::StoreUnavailable(format!("http client: {e}")))?;
        Ok(Self { client, cfg })
    }

    fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.cfg.api_url, self.cfg.repo, self.cfg.path
        )
    }

    fn blob_url(&self, sha: &str) -> String {
        format!("{}/repos/{}/git/blobs/{sha}", self.cfg.api_url, self.cfg.repo)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.cfg.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn decode(resp: ContentsResponse) -> Result<(BucketSet, Version), BucketError> {
        if resp.encoding != "base64" {
            return Err(BucketError::StoreCorrupt(format!(
                "unsupported content encoding {:?}",
                resp.encoding
            )));
        }
        // GitHub wraps base64 payloads at 60 columns.
        let packed: String = resp
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let raw = STANDARD
            .decode(packed)
            .map_err(|e| BucketError::StoreCorrupt(format!("decode base64: {e}")))?;
        let set: BucketSet = serde_json::from_slice(&raw)
            .map_err(|e| BucketError::StoreCorrupt(format!("parse document: {e}")))?;
        set.validate()?;
        Ok((set, Version::new(resp.sha)))
    }
}

impl GithubBucketStore {
    async fn fetch_blob(&self, sha: &str) -> Result<ContentsResponse, BucketError> {
        let resp = self
            .request(reqwest::Method::GET, self.blob_url(sha))
            .send()
            .await
            .map_err(unavailable)?;
        if !resp.status().is_success() {
            return Err(BucketError::StoreUnavailable(error_message(resp).await));
        }
        resp.json()
            .await
            .map_err(|e| BucketError::StoreCorrupt(format!("blob response: {e}")))
    }
}

fn unavailable(e: reqwest::Error) -> BucketError {
    BucketError::StoreUnavailable(e.to_string())
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(v) => match v.get("message").and_then(|m| m.as_str()) {
            Some(msg) => format!("{status}: {msg}"),
            None => format!("{status}: {body}"),
        },
        Err(_) => format!("{status}: {body}"),
    }
}

#[async_trait]
impl BucketStore for GithubBucketStore {
    async fn load(&self) -> Result<(BucketSet, Version), BucketError> {
        let resp = self
            .request(reqwest::Method::GET, self.contents_url())
            .query(&[("ref", self.cfg.branch.as_str())])
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(repo = %self.cfg.repo, path = %self.cfg.path, "bucket document not found, starting empty");
            return Ok((BucketSet::new(), Version::none()));
        }
        if !status.is_success() {
            return Err(BucketError::StoreUnavailable(error_message(resp).await));
        }

        let mut body: ContentsResponse = resp
            .json()
            .await
            .map_err(|e| BucketError::StoreCorrupt(format!("contents response: {e}")))?;
        // Files over 1 MB come back without inline content.
        if body.encoding == "none" {
            debug!(sha = %body.sha, "bucket document too large for contents api, fetching blob");
            body = self.fetch_blob(&body.sha).await?;
        }
        let (set, version) = Self::decode(body)?;
        debug!(revision = set.revision, buckets = set.len(), sha = %version, "github bucket store loaded");
        Ok((set, version))
    }

    async fn save(&self, set: &BucketSet, expected: &Version) -> Result<Version, BucketError> {
        let revision = set.revision + 1;
        let json = serde_json::to_vec_pretty(&Document::new(set, revision))
            .map_err(|e| BucketError::StoreUnavailable(format!("encode document: {e}")))?;
        let body = UpdateRequest {
            message: &self.cfg.commit_message,
            content: STANDARD.encode(json),
            sha: (!expected.is_none()).then(|| expected.as_str()),
            branch: &self.cfg.branch,
        };

        let resp = self
            .request(reqwest::Method::PUT, self.contents_url())
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status();
        if status == StatusCode::CONFLICT
            || (status == StatusCode::UNPROCESSABLE_ENTITY && expected.is_none())
        {
            let msg = error_message(resp).await;
            warn!(repo = %self.cfg.repo, expected = %expected, "github bucket store conflict: {msg}");
            return Err(BucketError::StoreConflict(msg));
        }
        if !status.is_success() {
            return Err(BucketError::StoreUnavailable(error_message(resp).await));
        }

        let updated: UpdateResponse = resp
            .json()
            .await
            .map_err(|e| BucketError::StoreUnavailable(format!("update response: {e}")))?;
        debug!(revision, sha = %updated.content.sha, "github bucket store saved");
        Ok(Version::new(updated.content.sha))
    }
}
