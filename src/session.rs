use crate::profile::{Profile, ProfileField, classify_question};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session")]
    Unknown,
    #[error("session store unavailable: {0}")]
    Provider(String),
}

/// Where a conversation stands. Once a session leaves `Collecting` it never
/// accepts input again; the browser-side reveal delay has no window in which
/// the session briefly would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Collecting,
    Reporting,
    Closed(ClosedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClosedReason {
    NoRights,
    EngineFault,
}

/// Per-conversation context, held as one explicit object keyed by session
/// id so independent conversations never share state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub profile: Profile,
    /// Most recent bot question, the keyword classifier's input.
    pub last_question: String,
    /// Field the engine announced for the pending question, if any.
    /// Takes precedence over keyword classification.
    pub pending_field: Option<ProfileField>,
    pub phase: Phase,
    pub final_report: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile: Profile::default(),
            last_question: String::new(),
            pending_field: None,
            phase: Phase::Collecting,
            final_report: None,
            created_at: Utc::now(),
        }
    }

    pub fn accepts_input(&self) -> bool {
        self.phase == Phase::Collecting
    }

    /// Record a user message into at most one profile field: the engine's
    /// announced field wins, otherwise the last question is keyword-matched.
    /// Returns the field the answer landed in; `None` means the message is
    /// recorded nowhere (it still appears in the browser transcript).
    pub fn record_answer(&mut self, message: &str) -> Option<ProfileField> {
        let field = self
            .pending_field
            .or_else(|| classify_question(&self.last_question))?;
        self.profile.set(field, message);
        Some(field)
    }

    /// Store the next question the engine asked, with its optional field hint.
    /// Unknown field keys fall back to keyword classification.
    pub fn note_question(&mut self, question: &str, field_hint: Option<&str>) {
        self.last_question = question.to_string();
        self.pending_field = field_hint.and_then(ProfileField::from_key);
    }

    pub fn complete(&mut self, report: String) {
        self.final_report = Some(report);
        self.phase = Phase::Reporting;
        self.pending_field = None;
    }

    pub fn close(&mut self, reason: ClosedReason) {
        self.phase = Phase::Closed(reason);
        self.pending_field = None;
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Session persistence boundary. Handlers work on a clone and put the
/// mutated session back only after a successful turn, so a failed engine
/// call leaves the stored state untouched.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self) -> Result<ChatSession, SessionError>;
    async fn get(&self, id: &str) -> Result<Option<ChatSession>, SessionError>;
    async fn put(&self, session: ChatSession) -> Result<(), SessionError>;
}

/// In-memory store with lazy TTL expiry. A zero TTL means sessions never
/// expire.
pub struct InMemorySessionStore {
    ttl: Duration,
    inner: RwLock<HashMap<String, ChatSession>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(HashMap::new()),
        }
    }

    fn expired(&self, session: &ChatSession) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let age = Utc::now().signed_duration_since(session.created_at);
        age.to_std().map(|age| age > self.ttl).unwrap_or(false)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Result<ChatSession, SessionError> {
        let session = ChatSession::new();
        let mut inner = self.inner.write().await;
        if !self.ttl.is_zero() {
            let stale: Vec<String> = inner
                .values()
                .filter(|s| self.expired(s))
                .map(|s| s.id.clone())
                .collect();
            for id in stale {
                inner.remove(&id);
            }
        }
        inner.insert(session.id.clone(), session.clone());
        tracing::debug!(session_id = %session.id, "issued chat session");
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, SessionError> {
        let hit = self.inner.read().await.get(id).cloned();
        match hit {
            Some(session) if self.expired(&session) => {
                self.inner.write().await.remove(id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(&self, session: ChatSession) -> Result<(), SessionError> {
        self.inner.write().await.insert(session.id.clone(), session);
        Ok(())
    }
}
