// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory conversation store
//!
//! The outer map is only write-locked to add or remove sessions. Each session
//! has its own mutex, so requests on different ids never wait on each other and
//! requests on the same id are serialised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::message::{Message, Session};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session id must not be empty")]
    EmptyId,
}

/// Optional bounds on session growth; both unset means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionLimits {
    /// Creating a session beyond this count evicts the least recently active one
    pub max_sessions: Option<usize>,
    /// Sessions idle longer than this are removed by `purge_idle`
    pub idle_ttl: Option<Duration>,
}

struct SessionSlot {
    session: Mutex<Session>,
    /// Store-wide sequence number of the last touch, for LRU ordering
    last_seq: AtomicU64,
    /// Milliseconds since store start at the last touch
    last_ms: AtomicU64,
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    limits: SessionLimits,
    clock: AtomicU64,
    started: Instant,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
            clock: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Fresh random session identifier
    pub fn create_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn touch(&self, slot: &SessionSlot) {
        let seq = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        slot.last_seq.store(seq, Ordering::Relaxed);
        slot.last_ms
            .store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn validate(session_id: &str) -> Result<(), SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::EmptyId);
        }
        Ok(())
    }

    async fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, SessionError> {
        Self::validate(session_id)?;

        if let Some(slot) = self.sessions.read().await.get(session_id).cloned() {
            return Ok(slot);
        }

        let mut sessions = self.sessions.write().await;
        // Another request may have created it while we waited for the write lock
        if let Some(slot) = sessions.get(session_id).cloned() {
            return Ok(slot);
        }

        if let Some(max) = self.limits.max_sessions {
            while sessions.len() >= max.max(1) {
                let oldest = sessions
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_seq.load(Ordering::Relaxed))
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        sessions.remove(&id);
                        info!("Evicted least recently active session {}", id);
                    }
                    None => break,
                }
            }
        }

        let slot = Arc::new(SessionSlot {
            session: Mutex::new(Session::new(session_id)),
            last_seq: AtomicU64::new(0),
            last_ms: AtomicU64::new(0),
        });
        self.touch(&slot);
        sessions.insert(session_id.to_string(), Arc::clone(&slot));
        debug!("Created session {}", session_id);

        Ok(slot)
    }

    /// Existing session, or a new empty one
    pub async fn get_or_create(&self, session_id: &str) -> Result<Session, SessionError> {
        let slot = self.slot(session_id).await?;
        let session = slot.session.lock().await;
        Ok(session.clone())
    }

    /// Snapshot of an existing session without creating it
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let slot = self.sessions.read().await.get(session_id).cloned()?;
        let session = slot.session.lock().await;
        Some(session.clone())
    }

    /// Apply `update` to the session that is currently stored under `session_id`
    async fn update_live<R>(
        &self,
        session_id: &str,
        update: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        loop {
            let slot = self.slot(session_id).await?;
            let mut session = slot.session.lock().await;
            // Eviction or purge may have dropped the slot before we locked it
            let sessions = self.sessions.read().await;
            if sessions
                .get(session_id)
                .is_some_and(|live| Arc::ptr_eq(live, &slot))
            {
                let result = update(&mut session);
                self.touch(&slot);
                return Ok(result);
            }
            debug!("Session {} was removed while waiting, retrying", session_id);
        }
    }

    pub async fn append(&self, session_id: &str, message: Message) -> Result<(), SessionError> {
        self.update_live(session_id, |session| session.push(message))
            .await
    }

    /// Record a question and its answer as one uninterrupted pair
    pub async fn append_turn(
        &self,
        session_id: &str,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<(), SessionError> {
        let (question, answer): (String, String) = (question.into(), answer.into());
        self.update_live(session_id, |session| {
            session.push(Message::user(question));
            session.push(Message::assistant(answer));
        })
        .await
    }

    /// Most recent `max_turns` messages, oldest first; empty for unknown ids
    pub async fn history(&self, session_id: &str, max_turns: usize) -> Vec<Message> {
        let slot = match self.sessions.read().await.get(session_id).cloned() {
            Some(slot) => slot,
            None => return Vec::new(),
        };
        let session = slot.session.lock().await;
        session.recent(max_turns)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle longer than the configured TTL; returns how many
    pub async fn purge_idle(&self) -> usize {
        let ttl = match self.limits.idle_ttl {
            Some(ttl) => ttl.as_millis() as u64,
            None => return 0,
        };
        let now = self.started.elapsed().as_millis() as u64;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| now.saturating_sub(slot.last_ms.load(Ordering::Relaxed)) <= ttl);
        let purged = before - sessions.len();
        if purged > 0 {
            info!("Purged {} idle sessions", purged);
        }
        purged
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}
