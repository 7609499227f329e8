//! Per-session conversation history.
//!
//! [`SessionHistoryStore`] is the only owner of turns. The augmenter and
//! orchestrator borrow read/append access through it and never keep their
//! own copy across calls. Backends are chosen by configuration.

pub mod cache;
pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{HistoryBackend, HistoryConfig};
use crate::models::{Role, Turn};

pub use cache::CacheStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors from a history backend.
///
/// A failed read is never reported as an empty history.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt history record for session {session_id} at line {line}: {reason}")]
    Corrupt {
        session_id: String,
        line: usize,
        reason: String,
    },
}

/// Durable, append-only, per-session log of turns.
#[async_trait]
pub trait SessionHistoryStore: Send + Sync {
    /// Return the session's turns in append order; empty for an unknown session.
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;

    /// Append exactly one turn, creating the session if absent.
    async fn append(&self, session_id: &str, turn: Turn) -> Result<(), StoreError> {
        self.append_all(session_id, vec![turn]).await
    }

    /// Append several turns as one unit: either all of them are recorded,
    /// in order, or none are.
    async fn append_all(&self, session_id: &str, turns: Vec<Turn>) -> Result<(), StoreError>;

    /// Append `turn` unless the session already holds a turn with the same
    /// role. The check and the write happen under one session lock.
    /// Returns whether the turn was appended.
    async fn append_if_absent(&self, session_id: &str, turn: Turn) -> Result<bool, StoreError>;

    /// Whether any stored turn of this session carries `role`.
    async fn exists_turn_with_role(&self, session_id: &str, role: Role) -> Result<bool, StoreError> {
        Ok(self.load(session_id).await?.iter().any(|t| t.role == role))
    }
}

/// Build the configured backend.
pub fn open_store(config: &HistoryConfig) -> Arc<dyn SessionHistoryStore> {
    match config.backend {
        HistoryBackend::Memory => Arc::new(MemoryStore::new()),
        HistoryBackend::File => Arc::new(FileStore::new(config.resolved_dir())),
        HistoryBackend::Cache => {
            let store = Arc::new(CacheStore::new(Duration::from_secs(config.ttl_secs)));
            if tokio::runtime::Handle::try_current().is_ok() {
                CacheStore::spawn_purger(&store, purge_interval(config.ttl_secs));
            } else {
                tracing::warn!("no async runtime, expired cache sessions are freed only on read");
            }
            store
        }
    }
}

/// Sweep often enough that an idle session outlives its TTL by at most a minute.
fn purge_interval(ttl_secs: u64) -> Duration {
    Duration::from_secs(ttl_secs.clamp(1, 60))
}
