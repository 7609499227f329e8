//! Process-lifetime history backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use super::{SessionHistoryStore, StoreError};
use crate::models::Turn;

type SessionLog = Arc<Mutex<Vec<Turn>>>;

/// In-memory store. Each session has its own lock so different sessions
/// never wait on each other beyond the brief map lookup.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionLog>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions seen so far.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    fn get(&self, session_id: &str) -> Result<Option<SessionLog>, StoreError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    fn get_or_create(&self, session_id: &str) -> Result<SessionLog, StoreError> {
        if let Some(log) = self.get(session_id)? {
            return Ok(log);
        }
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(Arc::clone(sessions.entry(session_id.to_string()).or_default()))
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("in-memory history lock poisoned".to_string())
}

#[async_trait]
impl SessionHistoryStore for MemoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        match self.get(session_id)? {
            Some(log) => Ok(log.lock().map_err(poisoned)?.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn append_all(&self, session_id: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        let log = self.get_or_create(session_id)?;
        log.lock().map_err(poisoned)?.extend(turns);
        Ok(())
    }

    async fn append_if_absent(&self, session_id: &str, turn: Turn) -> Result<bool, StoreError> {
        let log = self.get_or_create(session_id)?;
        let mut turns = log.lock().map_err(poisoned)?;
        if turns.iter().any(|t| t.role == turn.role) {
            return Ok(false);
        }
        turns.push(turn);
        Ok(true)
    }
}
