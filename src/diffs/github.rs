//! GitHub REST API diff source.
//!
//! Requests `GET /repos/{owner}/{name}/pulls/{number}` with the diff media
//! type, then strips binary file sections. Works against GitHub Enterprise
//! by pointing `[diffs] api_url` at the instance's API root.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};

use super::{DiffError, DiffSource, supported_sections};
use crate::config::DiffsConfig;
use crate::models::PullRequestRef;

const DIFF_MEDIA_TYPE: &str = "application/vnd.github.v3.diff";

/// Fetches pull request diffs from the GitHub API.
pub struct GitHubDiffSource {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubDiffSource {
    /// Build a source from configuration.
    pub fn new(config: &DiffsConfig) -> Result<Self, DiffError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DiffError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    /// Full URL for a pull request.
    fn pull_url(&self, pr: &PullRequestRef) -> Result<String, DiffError> {
        let (owner, name) = split_repo(&pr.repo)?;
        Ok(format!(
            "{}/repos/{owner}/{name}/pulls/{}",
            self.api_url, pr.number
        ))
    }
}

/// Split `owner/name`, rejecting anything else.
///
/// Both parts end up in the request path, so they are limited to the
/// characters GitHub allows in account and repository names.
fn split_repo(repo: &str) -> Result<(&str, &str), DiffError> {
    match repo.split_once('/') {
        Some((owner, name)) if is_path_segment(owner) && is_path_segment(name) => {
            Ok((owner, name))
        }
        _ => Err(DiffError::InvalidRepo(repo.to_string())),
    }
}

fn is_path_segment(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[async_trait]
impl DiffSource for GitHubDiffSource {
    async fn get_diffs(&self, pr: &PullRequestRef) -> Result<String, DiffError> {
        let url = self.pull_url(pr)?;
        tracing::debug!(%pr, %url, "fetching pull request diff");

        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, DIFF_MEDIA_TYPE)
            .header(USER_AGENT, crate::constants::APP_NAME);
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DiffError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(DiffError::Api(format!(
                "fetching {pr} failed with HTTP {status}: {body}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DiffError::Request(e.to_string()))?;
        Ok(supported_sections(&body))
    }
}
