//! Storage port for Magpie.
//!
//! The core holds sessions, transcripts, memories, skills, and scheduled
//! tasks by id and re-fetches them through the [`Storage`] trait; the
//! SQLite backend here is the default implementation. All methods are
//! synchronous and safe for concurrent use (callers share one
//! `Arc<dyn Storage>` across tasks).

pub mod error;
pub mod sqlite;

pub use error::{Result, StorageError};
pub use sqlite::SqliteStorage;

use magpie_types::{MemoryKind, MemoryRecord, SessionRecord, SkillRecord, StoredMessage, TaskRecord};

/// The storage port.
///
/// Implementations own record lifetimes; the core never deletes sessions
/// (the `delete_session` operation exists for the management API surface).
pub trait Storage: Send + Sync {
    // ── Sessions ─────────────────────────────────────────────────────────

    /// Fetch the session for `(channel, chat_id)`, creating it on first
    /// inbound for that identity.
    fn get_or_create_session(
        &self,
        channel: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Result<SessionRecord>;

    fn get_session(&self, id: i64) -> Result<Option<SessionRecord>>;

    /// All sessions, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    /// Remove a session and its messages. Returns whether it existed.
    fn delete_session(&self, id: i64) -> Result<bool>;

    fn set_last_consolidated(&self, session_id: i64, value: i64) -> Result<()>;

    // ── Messages ─────────────────────────────────────────────────────────

    /// Append a transcript message, returning its assigned id.
    fn append_message(&self, msg: &StoredMessage) -> Result<i64>;

    /// The last `limit` messages of a session, oldest first.
    fn recent_messages(&self, session_id: i64, limit: usize) -> Result<Vec<StoredMessage>>;

    fn count_messages(&self, session_id: i64) -> Result<usize>;

    // ── Memories ─────────────────────────────────────────────────────────

    /// Insert or replace a memory by its globally unique key. Returns the
    /// record id.
    fn upsert_memory(&self, record: &MemoryRecord) -> Result<i64>;

    fn get_memory_by_key(&self, key: &str) -> Result<Option<MemoryRecord>>;

    /// Live (not soft-deleted) memories, optionally filtered by kind.
    fn list_memories(&self, kind: Option<MemoryKind>) -> Result<Vec<MemoryRecord>>;

    /// Mark a memory deleted by key. Returns whether it existed.
    fn soft_delete_memory(&self, key: &str) -> Result<bool>;

    /// Drop `history` memories older than `max_age_days` along with any
    /// soft-deleted record. Returns how many rows were removed.
    fn prune_history(&self, max_age_days: i64) -> Result<usize>;

    // ── Skills ───────────────────────────────────────────────────────────

    fn create_skill(&self, skill: &SkillRecord) -> Result<i64>;
    fn get_skill(&self, id: i64) -> Result<Option<SkillRecord>>;
    fn list_skills(&self) -> Result<Vec<SkillRecord>>;
    fn update_skill(&self, skill: &SkillRecord) -> Result<()>;
    fn delete_skill(&self, id: i64) -> Result<bool>;

    // ── Scheduled tasks ──────────────────────────────────────────────────

    fn create_task(&self, task: &TaskRecord) -> Result<i64>;
    fn list_tasks(&self) -> Result<Vec<TaskRecord>>;
    fn delete_task(&self, name: &str) -> Result<bool>;

    // ── Adapter configuration blobs ──────────────────────────────────────

    fn set_channel_config(&self, name: &str, value: &serde_json::Value) -> Result<()>;
    fn get_channel_config(&self, name: &str) -> Result<Option<serde_json::Value>>;
    fn set_provider_config(&self, name: &str, value: &serde_json::Value) -> Result<()>;
    fn get_provider_config(&self, name: &str) -> Result<Option<serde_json::Value>>;
}
