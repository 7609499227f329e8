//! In-memory history with a sliding expiry.
//!
//! Every append pushes the session's deadline `ttl` into the future. Once
//! the deadline passes the session reads as empty and the next append
//! starts a fresh log. Expired sessions are dropped from the map when read
//! and by a periodic sweep, so abandoned sessions do not accumulate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::{SessionHistoryStore, StoreError};
use crate::models::Turn;

struct CachedSession {
    turns: Vec<Turn>,
    expires_at: Instant,
}

impl CachedSession {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Clear a lapsed log before it is written to again.
    fn renew(&mut self, now: Instant, ttl: Duration) {
        if self.is_expired(now) {
            self.turns.clear();
        }
        self.expires_at = now + ttl;
    }
}

/// Expiring in-memory store.
pub struct CacheStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Mutex<CachedSession>>>,
}

impl CacheStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of sessions currently held, expired or not.
    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let Ok(mut sessions) = self.sessions.write() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, entry| {
            entry
                .lock()
                .map(|session| !session.is_expired(now))
                .unwrap_or(false)
        });
        before - sessions.len()
    }

    /// Run [`purge_expired`](Self::purge_expired) every `every` until the
    /// store is dropped.
    pub fn spawn_purger(store: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.purge_expired();
                if removed > 0 {
                    tracing::debug!(removed, "purged expired history sessions");
                }
            }
        })
    }

    /// Run `f` on the session's entry, creating it if absent.
    ///
    /// The map lock is held while `f` runs, so a concurrent purge can never
    /// detach an entry that is being written.
    fn with_session<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut CachedSession) -> R,
    ) -> Result<R, StoreError> {
        {
            let sessions = self.sessions.read().map_err(poisoned)?;
            if let Some(entry) = sessions.get(session_id) {
                let mut session = entry.lock().map_err(poisoned)?;
                return Ok(f(&mut *session));
            }
        }
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            Mutex::new(CachedSession {
                turns: Vec::new(),
                expires_at: Instant::now() + self.ttl,
            })
        });
        let mut session = entry.lock().map_err(poisoned)?;
        Ok(f(&mut *session))
    }

    /// Remove the session if it is still expired.
    fn evict(&self, session_id: &str, now: Instant) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let expired = match sessions.get(session_id) {
            Some(entry) => entry.lock().map_err(poisoned)?.is_expired(now),
            None => false,
        };
        if expired {
            sessions.remove(session_id);
        }
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("cache history lock poisoned".to_string())
}

#[async_trait]
impl SessionHistoryStore for CacheStore {
    async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let now = Instant::now();
        let turns = {
            let sessions = self.sessions.read().map_err(poisoned)?;
            let Some(entry) = sessions.get(session_id) else {
                return Ok(Vec::new());
            };
            let session = entry.lock().map_err(poisoned)?;
            if session.is_expired(now) {
                None
            } else {
                Some(session.turns.clone())
            }
        };
        match turns {
            Some(turns) => Ok(turns),
            None => {
                self.evict(session_id, now)?;
                Ok(Vec::new())
            }
        }
    }

    async fn append_all(&self, session_id: &str, turns: Vec<Turn>) -> Result<(), StoreError> {
        let now = Instant::now();
        self.with_session(session_id, |session| {
            session.renew(now, self.ttl);
            session.turns.extend(turns);
        })
    }

    async fn append_if_absent(&self, session_id: &str, turn: Turn) -> Result<bool, StoreError> {
        let now = Instant::now();
        self.with_session(session_id, |session| {
            session.renew(now, self.ttl);
            if session.turns.iter().any(|t| t.role == turn.role) {
                return false;
            }
            session.turns.push(turn);
            true
        })
    }
}
