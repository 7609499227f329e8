//! Inbound chat message and the identifiers that travel with it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository identifier plus a pull request number.
///
/// Supplied per message and never stored as session state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub repo: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn new(repo: impl Into<String>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// Addresses one conversation: the channel path carries both parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

/// One JSON text frame received from a chat client.
///
/// Clients may also send `user_id` and `session_id` in the body. The
/// channel path is authoritative, so unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub pr_number: Option<u64>,
}

impl ChatRequest {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The pull request this message refers to, when both parts are present.
    pub fn pull_request(&self) -> Option<PullRequestRef> {
        match (&self.repo, self.pr_number) {
            (Some(repo), Some(number)) if !repo.trim().is_empty() => {
                Some(PullRequestRef::new(repo.trim(), number))
            }
            _ => None,
        }
    }
}
