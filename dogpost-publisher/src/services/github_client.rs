//! GitHub contents API client
//!
//! Implements [`DocumentStore`] on top of the repository contents endpoint.
//! Every upload looks the path up first to obtain the current blob `sha`,
//! then creates or updates the file in one PUT.
//!
//! The lookup is biased toward create: any outcome other than 200 (404,
//! other statuses, transport errors, timeouts) proceeds as a create. A
//! wrong guess surfaces as a failed write, never as a silent overwrite.
//!
//! # API Reference
//! - `GET {api}/repos/{owner}/{repo}/contents/{path}`
//! - `PUT {api}/repos/{owner}/{repo}/contents/{path}` with
//!   `{message, content, sha?, branch?}`

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DocumentStore, RemoteFile, UploadReceipt};

const GITHUB_API_URL: &str = "https://api.github.com";

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

const USER_AGENT: &str = concat!("dogpost/", env!("CARGO_PKG_VERSION"));

/// GitHub client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token (`GITHUB_TOKEN` overrides)
    pub token: Option<String>,
    /// `owner/name` (`GITHUB_REPO` overrides)
    pub repo: Option<String>,
    pub api_base_url: String,
    /// Target branch; repository default when unset
    pub branch: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            repo: None,
            api_base_url: GITHUB_API_URL.to_string(),
            branch: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<ContentsEntry>,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

/// GitHub contents API client
pub struct GitHubClient {
    http_client: Client,
    token: String,
    repo: String,
    api_base_url: String,
    branch: Option<String>,
    /// One lock per path, held across lookup and write
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GitHubClient {
    /// Create a client; fails when the token or repository is missing
    pub fn new(config: &GitHubConfig) -> PipelineResult<Self> {
        let token = required(&config.token, "GITHUB_TOKEN")?;
        let repo = required(&config.repo, "GITHUB_REPO")?;
        if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(PipelineError::Config(format!(
                "GITHUB_REPO must be owner/name, got '{}'",
                repo
            )));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            token,
            repo,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            branch: config.branch.clone().filter(|b| !b.trim().is_empty()),
            path_locks: Mutex::new(HashMap::new()),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base_url,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    async fn lock_for(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.path_locks.lock().await;
        locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry for `path` when no other upload holds or awaits it
    async fn release_lock(&self, path: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.path_locks.lock().await;
        // One reference in the map, one in `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(path);
        }
    }

    /// Current blob `sha` of `path`, or `None` to create
    pub async fn lookup_revision(&self, path: &str) -> Option<String> {
        let mut request = self
            .http_client
            .get(self.contents_url(path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, GITHUB_ACCEPT);
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch)]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path, "Lookup failed, treating as new file: {}", e);
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => match response.json::<ContentsEntry>().await {
                Ok(entry) => Some(entry.sha),
                Err(e) => {
                    warn!(path, "Lookup response unreadable, treating as new file: {}", e);
                    None
                }
            },
            StatusCode::NOT_FOUND => None,
            status => {
                warn!(path, status = status.as_u16(), "Unexpected lookup status, treating as new file");
                None
            }
        }
    }

    /// Write one file; `file.revision_token` selects update over create
    pub async fn put(&self, file: &RemoteFile) -> PipelineResult<UploadReceipt> {
        let body = PutRequest {
            message: &file.commit_message,
            content: &file.content_base64,
            sha: file.revision_token.as_deref(),
            branch: self.branch.as_deref(),
        };

        let response = self
            .http_client
            .put(self.contents_url(&file.path))
            .bearer_auth(&self.token)
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                PipelineError::from_transport(&format!("store write {}", file.path), e, |e| {
                    PipelineError::StoreWriteFailed {
                        path: file.path.clone(),
                        status_body: e.to_string(),
                    }
                })
            })?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(PipelineError::StoreWriteFailed {
                path: file.path.clone(),
                status_body: format!("{}: {}", status, text),
            });
        }

        let revision_token = serde_json::from_str::<PutResponse>(&text)
            .ok()
            .and_then(|r| r.content)
            .map(|c| c.sha);

        Ok(UploadReceipt {
            path: file.path.clone(),
            created: file.revision_token.is_none(),
            revision_token,
        })
    }
}

fn required(value: &Option<String>, key: &str) -> PipelineResult<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Config(format!("{} is not configured", key)))
}

#[async_trait]
impl DocumentStore for GitHubClient {
    async fn upload(
        &self,
        path: &str,
        content_base64: &str,
        commit_message: &str,
    ) -> PipelineResult<UploadReceipt> {
        let lock = self.lock_for(path).await;
        let result = {
            let _guard = lock.lock().await;

            let revision_token = self.lookup_revision(path).await;
            debug!(path, update = revision_token.is_some(), "Uploading");

            let file = RemoteFile {
                path: path.to_string(),
                content_base64: content_base64.to_string(),
                commit_message: commit_message.to_string(),
                revision_token,
            };
            self.put(&file).await
        };
        self.release_lock(path, lock).await;
        let receipt = result?;

        info!(
            path,
            created = receipt.created,
            "Uploaded to {}",
            self.repo
        );
        Ok(receipt)
    }
}
