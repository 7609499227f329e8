//! Filesystem-based history backend.
//!
//! Stores one JSON-lines file per session in `~/.config/prchat/history/`
//! (or the configured directory). File names are the SHA-256 of the
//! session id so arbitrary client-supplied ids are safe on disk.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::{SessionHistoryStore, StoreError};
use crate::models::{Role, Turn};

/// One persisted line.
#[derive(Debug, Serialize, Deserialize)]
struct TurnRecord {
    session_id: String,
    index: usize,
    role: Role,
    text: String,
    timestamp: DateTime<Utc>,
}

impl From<TurnRecord> for Turn {
    fn from(record: TurnRecord) -> Self {
        Turn {
            role: record.role,
            text: record.text,
            timestamp: record.timestamp,
        }
    }
}

/// JSON-lines store with per-session write serialization.
pub struct FileStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the session files.
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Get the file path for a session id.
    fn session_path(&self, session_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        self.dir.join(format!("{}.jsonl", hex::encode(hasher.finalize())))
    }

    fn session_lock(&self, session_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Unavailable("history lock table poisoned".to_string()))?;
        Ok(Arc::clone(locks.entry(session_id.to_string()).or_default()))
    }

    /// Forget the session's lock once no other task holds or awaits it.
    fn release_lock(&self, session_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // One reference in the table, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    /// Write `turns` as one buffer, numbering them from `start`.
    /// Callers hold the session lock.
    async fn write_turns(
        &self,
        session_id: &str,
        start: usize,
        turns: Vec<Turn>,
    ) -> Result<(), StoreError> {
        let mut buf = String::new();
        for (offset, turn) in turns.into_iter().enumerate() {
            let record = TurnRecord {
                session_id: session_id.to_string(),
                index: start + offset,
                role: turn.role,
                text: turn.text,
                timestamp: turn.timestamp,
            };
            let line = serde_json::to_string(&record)
                .map_err(|e| StoreError::Unavailable(format!("failed to encode turn: {e}")))?;
            buf.push_str(&line);
            buf.push('\n');
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| unavailable(&self.dir, e))?;

        let path = self.session_path(session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| unavailable(&path, e))?;
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| unavailable(&path, e))?;
        file.flush().await.map_err(|e| unavailable(&path, e))?;
        Ok(())
    }

    async fn read_records(&self, session_id: &str) -> Result<Vec<TurnRecord>, StoreError> {
        let path = self.session_path(session_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable(&path, e)),
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<TurnRecord>(line).map_err(|e| StoreError::Corrupt {
                    session_id: session_id.to_string(),
                    line: i + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {err}", path.display()))
}

#[async_trait]
impl SessionHistoryStore for FileStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let records = self.read_records(session_id).await?;
        Ok(records.into_iter().map(Turn::from).collect())
    }

    async fn append_all(&self, session_id: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        let lock = self.session_lock(session_id)?;
        let guard = lock.lock().await;
        let result = match self.read_records(session_id).await {
            Ok(records) => self.write_turns(session_id, records.len(), turns).await,
            Err(e) => Err(e),
        };
        drop(guard);
        self.release_lock(session_id, lock);
        result
    }

    async fn append_if_absent(&self, session_id: &str, turn: Turn) -> Result<bool, StoreError> {
        let lock = self.session_lock(session_id)?;
        let guard = lock.lock().await;
        let result = match self.read_records(session_id).await {
            Ok(records) if records.iter().any(|r| r.role == turn.role) => Ok(false),
            Ok(records) => self
                .write_turns(session_id, records.len(), vec![turn])
                .await
                .map(|()| true),
            Err(e) => Err(e),
        };
        drop(guard);
        self.release_lock(session_id, lock);
        result
    }
}
