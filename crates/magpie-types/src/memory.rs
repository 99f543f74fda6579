//! Long-term memory records.

use serde::{Deserialize, Serialize};

use crate::{Timestamp, now};

/// Kind of a stored memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    /// Free-standing fact or note.
    Memory,
    /// Consolidated conversation summary.
    History,
    /// Scoped to a single session.
    Session,
    /// Scoped to a single user.
    User,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Memory => "memory",
            MemoryKind::History => "history",
            MemoryKind::Session => "session",
            MemoryKind::User => "user",
        }
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(MemoryKind::Memory),
            "history" => Ok(MemoryKind::History),
            "session" => Ok(MemoryKind::Session),
            "user" => Ok(MemoryKind::User),
            other => Err(format!("unknown memory kind '{}'", other)),
        }
    }
}

/// A persisted key→content record used for long-term context.
///
/// Keys are globally unique. `session` memories carry a session id and
/// `user` memories carry a user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub kind: MemoryKind,
    pub key: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub importance: f64,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MemoryRecord {
    /// Create an unsaved record (id 0 until the storage port assigns one).
    pub fn new(kind: MemoryKind, key: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: 0,
            kind,
            key: key.into(),
            content: content.into(),
            session_id: None,
            user_id: None,
            tags: Vec::new(),
            is_pinned: false,
            importance: 0.0,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Scope this record to a session.
    pub fn for_session(mut self, session_id: i64) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Scope this record to a user.
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the importance score.
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }
}
