//! Pull request diff retrieval.
//!
//! The diff source is an external collaborator: the chat core only relies
//! on [`DiffSource::get_diffs`] returning diff text or a failure.

pub mod github;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::PullRequestRef;

pub use github::GitHubDiffSource;

/// Errors fetching a pull request diff.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("invalid repository '{0}': expected owner/name")]
    InvalidRepo(String),

    #[error("diff request failed: {0}")]
    Request(String),

    #[error("diff API error: {0}")]
    Api(String),
}

/// Anything that can produce the unified diff of a pull request.
#[async_trait]
pub trait DiffSource: Send + Sync {
    /// Fetch the diff text. An empty string is a successful, empty diff.
    async fn get_diffs(&self, pr: &PullRequestRef) -> Result<String, DiffError>;
}

/// Drop binary file sections from a unified diff.
///
/// Sections start at `diff --git` lines. Text before the first header is
/// kept as-is.
pub fn supported_sections(diff: &str) -> String {
    let mut kept = String::with_capacity(diff.len());
    let mut section = String::new();
    let mut binary = false;

    let mut flush = |section: &mut String, binary: bool| {
        if !binary {
            kept.push_str(section);
        }
        section.clear();
    };

    for line in diff.split_inclusive('\n') {
        if line.starts_with("diff --git ") {
            flush(&mut section, binary);
            binary = false;
        }
        if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            binary = true;
        }
        section.push_str(line);
    }
    flush(&mut section, binary);

    kept
}
