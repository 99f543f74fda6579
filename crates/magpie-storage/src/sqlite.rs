//! SQLite implementation of the storage port.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};

use magpie_types::{
    MemoryKind, MemoryRecord, Role, SessionRecord, SkillRecord, StoredMessage, TaskRecord,
};

use crate::error::{Result, StorageError};
use crate::Storage;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    channel           TEXT NOT NULL,
    chat_id           TEXT NOT NULL,
    user_id           TEXT NOT NULL,
    last_consolidated INTEGER NOT NULL DEFAULT 0,
    metadata          TEXT NOT NULL DEFAULT '{}',
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE(channel, chat_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id        INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role              TEXT NOT NULL,
    content           TEXT NOT NULL,
    reasoning_content TEXT,
    tool_calls        TEXT,
    tool_call_id      TEXT,
    tool_name         TEXT,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, id);

CREATE TABLE IF NOT EXISTS memories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    kind        TEXT NOT NULL,
    key         TEXT NOT NULL UNIQUE,
    content     TEXT NOT NULL,
    session_id  INTEGER,
    user_id     TEXT,
    tags        TEXT NOT NULL DEFAULT '[]',
    is_pinned   INTEGER NOT NULL DEFAULT 0,
    importance  REAL NOT NULL DEFAULT 0,
    is_deleted  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS skills (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    prompt     TEXT NOT NULL,
    always_on  INTEGER NOT NULL DEFAULT 0,
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    cron_expr  TEXT NOT NULL,
    message    TEXT NOT NULL,
    channel    TEXT NOT NULL,
    chat_id    TEXT NOT NULL,
    enabled    INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_configs (
    name  TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS provider_configs (
    name  TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// SQLite-backed storage.
///
/// A single connection behind a mutex: operations are short, and SQLite
/// serializes writers anyway.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database, used by tests and the REPL.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row decoding helpers
// ─────────────────────────────────────────────────────────────────────────────

fn ts_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn ts_from_sql(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", raw, e)))
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<(SessionRecord, String, String, String)> {
    Ok((
        SessionRecord {
            id: row.get("id")?,
            channel: row.get("channel")?,
            chat_id: row.get("chat_id")?,
            user_id: row.get("user_id")?,
            last_consolidated: row.get("last_consolidated")?,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get::<_, String>("metadata")?,
        row.get::<_, String>("created_at")?,
        row.get::<_, String>("updated_at")?,
    ))
}

fn finish_session(raw: (SessionRecord, String, String, String)) -> Result<SessionRecord> {
    let (mut session, metadata, created_at, updated_at) = raw;
    session.metadata = serde_json::from_str(&metadata)
        .map_err(|e| StorageError::Corrupt(format!("bad session metadata: {}", e)))?;
    session.created_at = ts_from_sql(&created_at)?;
    session.updated_at = ts_from_sql(&updated_at)?;
    Ok(session)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<(StoredMessage, String, Option<String>, String)> {
    Ok((
        StoredMessage {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            role: Role::User,
            content: row.get("content")?,
            reasoning_content: row.get("reasoning_content")?,
            tool_calls: None,
            tool_call_id: row.get("tool_call_id")?,
            tool_name: row.get("tool_name")?,
            created_at: Utc::now(),
        },
        row.get::<_, String>("role")?,
        row.get::<_, Option<String>>("tool_calls")?,
        row.get::<_, String>("created_at")?,
    ))
}

fn finish_message(raw: (StoredMessage, String, Option<String>, String)) -> Result<StoredMessage> {
    let (mut msg, role, tool_calls, created_at) = raw;
    msg.role = role
        .parse()
        .map_err(|e: String| StorageError::Corrupt(e))?;
    if let Some(raw_calls) = tool_calls {
        msg.tool_calls = Some(
            serde_json::from_str(&raw_calls)
                .map_err(|e| StorageError::Corrupt(format!("bad tool_calls: {}", e)))?,
        );
    }
    msg.created_at = ts_from_sql(&created_at)?;
    Ok(msg)
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<(MemoryRecord, String, String, String, String)> {
    Ok((
        MemoryRecord {
            id: row.get("id")?,
            kind: MemoryKind::Memory,
            key: row.get("key")?,
            content: row.get("content")?,
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            tags: Vec::new(),
            is_pinned: row.get("is_pinned")?,
            importance: row.get("importance")?,
            is_deleted: row.get("is_deleted")?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get::<_, String>("kind")?,
        row.get::<_, String>("tags")?,
        row.get::<_, String>("created_at")?,
        row.get::<_, String>("updated_at")?,
    ))
}

fn finish_memory(
    raw: (MemoryRecord, String, String, String, String),
) -> Result<MemoryRecord> {
    let (mut record, kind, tags, created_at, updated_at) = raw;
    record.kind = kind.parse().map_err(|e: String| StorageError::Corrupt(e))?;
    record.tags = serde_json::from_str(&tags)
        .map_err(|e| StorageError::Corrupt(format!("bad tags: {}", e)))?;
    record.created_at = ts_from_sql(&created_at)?;
    record.updated_at = ts_from_sql(&updated_at)?;
    Ok(record)
}

fn skill_from_row(row: &Row<'_>) -> rusqlite::Result<(SkillRecord, String, String)> {
    Ok((
        SkillRecord {
            id: row.get("id")?,
            name: row.get("name")?,
            prompt: row.get("prompt")?,
            always_on: row.get("always_on")?,
            enabled: row.get("enabled")?,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        row.get::<_, String>("created_at")?,
        row.get::<_, String>("updated_at")?,
    ))
}

fn finish_skill(raw: (SkillRecord, String, String)) -> Result<SkillRecord> {
    let (mut skill, created_at, updated_at) = raw;
    skill.created_at = ts_from_sql(&created_at)?;
    skill.updated_at = ts_from_sql(&updated_at)?;
    Ok(skill)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<(TaskRecord, String)> {
    Ok((
        TaskRecord {
            id: row.get("id")?,
            name: row.get("name")?,
            cron_expr: row.get("cron_expr")?,
            message: row.get("message")?,
            channel: row.get("channel")?,
            chat_id: row.get("chat_id")?,
            enabled: row.get("enabled")?,
            created_at: Utc::now(),
        },
        row.get::<_, String>("created_at")?,
    ))
}

fn finish_task(raw: (TaskRecord, String)) -> Result<TaskRecord> {
    let (mut task, created_at) = raw;
    task.created_at = ts_from_sql(&created_at)?;
    Ok(task)
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Storage for SqliteStorage {
    fn get_or_create_session(
        &self,
        channel: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Result<SessionRecord> {
        let conn = self.conn.lock();

        let existing = conn
            .query_row(
                "SELECT * FROM sessions WHERE channel = ?1 AND chat_id = ?2",
                params![channel, chat_id],
                session_from_row,
            )
            .optional()?;

        if let Some(raw) = existing {
            return finish_session(raw);
        }

        let now = ts_to_sql(&Utc::now());
        conn.execute(
            "INSERT INTO sessions (channel, chat_id, user_id, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, '{}', ?4, ?4)",
            params![channel, chat_id, user_id, now],
        )?;

        let raw = conn.query_row(
            "SELECT * FROM sessions WHERE id = last_insert_rowid()",
            [],
            session_from_row,
        )?;
        finish_session(raw)
    }

    fn get_session(&self, id: i64) -> Result<Option<SessionRecord>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM sessions WHERE id = ?1", params![id], session_from_row)
            .optional()?
            .map(finish_session)
            .transpose()
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY updated_at DESC")?;
        let rows = stmt.query_map([], session_from_row)?;
        rows.map(|raw| finish_session(raw?)).collect()
    }

    fn delete_session(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn set_last_consolidated(&self, session_id: i64, value: i64) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE sessions SET last_consolidated = ?2 WHERE id = ?1",
            params![session_id, value],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    fn append_message(&self, msg: &StoredMessage) -> Result<i64> {
        let tool_calls = msg
            .tool_calls
            .as_ref()
            .map(|calls| serde_json::to_string(calls))
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("unencodable tool_calls: {}", e)))?;

        let conn = self.conn.lock();
        let now = ts_to_sql(&msg.created_at);
        conn.execute(
            "INSERT INTO messages
               (session_id, role, content, reasoning_content, tool_calls, tool_call_id, tool_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.session_id,
                msg.role.as_str(),
                msg.content,
                msg.reasoning_content,
                tool_calls,
                msg.tool_call_id,
                msg.tool_name,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE id = ?1",
            params![msg.session_id, ts_to_sql(&Utc::now())],
        )?;

        Ok(id)
    }

    fn recent_messages(&self, session_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], message_from_row)?;
        let mut messages: Vec<StoredMessage> = rows
            .map(|raw| finish_message(raw?))
            .collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    fn count_messages(&self, session_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn upsert_memory(&self, record: &MemoryRecord) -> Result<i64> {
        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| StorageError::Corrupt(format!("unencodable tags: {}", e)))?;

        let conn = self.conn.lock();
        let now = ts_to_sql(&Utc::now());
        conn.execute(
            "INSERT INTO memories
               (kind, key, content, session_id, user_id, tags, is_pinned, importance, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(key) DO UPDATE SET
               kind = excluded.kind,
               content = excluded.content,
               session_id = excluded.session_id,
               user_id = excluded.user_id,
               tags = excluded.tags,
               is_pinned = excluded.is_pinned,
               importance = excluded.importance,
               is_deleted = excluded.is_deleted,
               updated_at = excluded.updated_at",
            params![
                record.kind.as_str(),
                record.key,
                record.content,
                record.session_id,
                record.user_id,
                tags,
                record.is_pinned,
                record.importance,
                record.is_deleted,
                now,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM memories WHERE key = ?1",
            params![record.key],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn get_memory_by_key(&self, key: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT * FROM memories WHERE key = ?1",
            params![key],
            memory_from_row,
        )
        .optional()?
        .map(finish_memory)
        .transpose()
    }

    fn list_memories(&self, kind: Option<MemoryKind>) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock();
        match kind {
            Some(kind) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM memories WHERE is_deleted = 0 AND kind = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![kind.as_str()], memory_from_row)?;
                rows.map(|raw| finish_memory(raw?)).collect()
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM memories WHERE is_deleted = 0 ORDER BY id")?;
                let rows = stmt.query_map([], memory_from_row)?;
                rows.map(|raw| finish_memory(raw?)).collect()
            }
        }
    }

    fn soft_delete_memory(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE memories SET is_deleted = 1, updated_at = ?2 WHERE key = ?1",
            params![key, ts_to_sql(&Utc::now())],
        )?;
        Ok(updated > 0)
    }

    fn prune_history(&self, max_age_days: i64) -> Result<usize> {
        let cutoff = ts_to_sql(&(Utc::now() - chrono::Duration::days(max_age_days)));
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM memories
             WHERE is_deleted = 1
                OR (kind = 'history' AND is_pinned = 0 AND created_at < ?1)",
            params![cutoff],
        )?;
        Ok(removed)
    }

    fn create_skill(&self, skill: &SkillRecord) -> Result<i64> {
        let conn = self.conn.lock();
        let now = ts_to_sql(&Utc::now());
        conn.execute(
            "INSERT INTO skills (name, prompt, always_on, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![skill.name, skill.prompt, skill.always_on, skill.enabled, now],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_skill(&self, id: i64) -> Result<Option<SkillRecord>> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM skills WHERE id = ?1", params![id], skill_from_row)
            .optional()?
            .map(finish_skill)
            .transpose()
    }

    fn list_skills(&self) -> Result<Vec<SkillRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM skills ORDER BY id")?;
        let rows = stmt.query_map([], skill_from_row)?;
        rows.map(|raw| finish_skill(raw?)).collect()
    }

    fn update_skill(&self, skill: &SkillRecord) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE skills SET name = ?2, prompt = ?3, always_on = ?4, enabled = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                skill.id,
                skill.name,
                skill.prompt,
                skill.always_on,
                skill.enabled,
                ts_to_sql(&Utc::now()),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("skill {}", skill.id)));
        }
        Ok(())
    }

    fn delete_skill(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM skills WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    fn create_task(&self, task: &TaskRecord) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO tasks (name, cron_expr, message, channel, chat_id, enabled, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                task.name,
                task.cron_expr,
                task.message,
                task.channel,
                task.chat_id,
                task.enabled,
                ts_to_sql(&task.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY id")?;
        let rows = stmt.query_map([], task_from_row)?;
        rows.map(|raw| finish_task(raw?)).collect()
    }

    fn delete_task(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let deleted = conn.execute("DELETE FROM tasks WHERE name = ?1", params![name])?;
        Ok(deleted > 0)
    }

    fn set_channel_config(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO channel_configs (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value.to_string()],
        )?;
        Ok(())
    }

    fn get_channel_config(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM channel_configs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|v| {
            serde_json::from_str(&v)
                .map_err(|e| StorageError::Corrupt(format!("bad channel config: {}", e)))
        })
        .transpose()
    }

    fn set_provider_config(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO provider_configs (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![name, value.to_string()],
        )?;
        Ok(())
    }

    fn get_provider_config(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM provider_configs WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|v| {
            serde_json::from_str(&v)
                .map_err(|e| StorageError::Corrupt(format!("bad provider config: {}", e)))
        })
        .transpose()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_types::ToolCall;

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[test]
    fn test_session_identity_is_channel_chat() {
        let store = storage();

        let first = store
            .get_or_create_session("websocket", "chat-1", "user-1")
            .unwrap();
        let same = store
            .get_or_create_session("websocket", "chat-1", "user-1")
            .unwrap();
        let other = store
            .get_or_create_session("webhook", "chat-1", "user-1")
            .unwrap();

        assert_eq!(first.id, same.id);
        assert_ne!(first.id, other.id);
        assert_eq!(first.last_consolidated, 0);
    }

    #[test]
    fn test_message_round_trip_preserves_tool_fields() {
        let store = storage();
        let session = store.get_or_create_session("rest", "c", "u").unwrap();

        store
            .append_message(&StoredMessage::new(session.id, Role::User, "2+2?"))
            .unwrap();
        store
            .append_message(
                &StoredMessage::new(session.id, Role::Assistant, "checking")
                    .with_reasoning("needs math")
                    .with_tool_calls(vec![ToolCall::function(
                        "c1",
                        "calculator",
                        r#"{"expr":"2+2"}"#,
                    )]),
            )
            .unwrap();
        store
            .append_message(
                &StoredMessage::new(session.id, Role::Tool, "4")
                    .with_tool_result("c1", "calculator"),
            )
            .unwrap();

        let messages = store.recent_messages(session.id, 10).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "2+2?");

        let assistant = &messages[1];
        assert_eq!(assistant.reasoning_content.as_deref(), Some("needs math"));
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].name(), "calculator");
        assert_eq!(calls[0].arguments(), r#"{"expr":"2+2"}"#);

        assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(store.count_messages(session.id).unwrap(), 3);
    }

    #[test]
    fn test_recent_messages_window() {
        let store = storage();
        let session = store.get_or_create_session("rest", "c", "u").unwrap();
        for i in 0..10 {
            store
                .append_message(&StoredMessage::new(
                    session.id,
                    Role::User,
                    format!("m{}", i),
                ))
                .unwrap();
        }

        let recent = store.recent_messages(session.id, 3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "m7");
        assert_eq!(recent[2].content, "m9");
    }

    #[test]
    fn test_delete_session_cascades_messages() {
        let store = storage();
        let session = store.get_or_create_session("rest", "c", "u").unwrap();
        store
            .append_message(&StoredMessage::new(session.id, Role::User, "x"))
            .unwrap();

        assert!(store.delete_session(session.id).unwrap());
        assert!(!store.delete_session(session.id).unwrap());
        assert_eq!(store.count_messages(session.id).unwrap(), 0);
    }

    #[test]
    fn test_memory_upsert_by_key() {
        let store = storage();

        let record = MemoryRecord::new(MemoryKind::History, "summary_1", "v1").for_session(1);
        let id1 = store.upsert_memory(&record).unwrap();

        let record = MemoryRecord::new(MemoryKind::History, "summary_1", "v2").for_session(1);
        let id2 = store.upsert_memory(&record).unwrap();

        assert_eq!(id1, id2);
        let fetched = store.get_memory_by_key("summary_1").unwrap().unwrap();
        assert_eq!(fetched.content, "v2");
        assert_eq!(fetched.session_id, Some(1));
    }

    #[test]
    fn test_list_memories_filters() {
        let store = storage();
        store
            .upsert_memory(&MemoryRecord::new(MemoryKind::Memory, "a", "fact"))
            .unwrap();
        store
            .upsert_memory(&MemoryRecord::new(MemoryKind::History, "b", "summary"))
            .unwrap();
        store.soft_delete_memory("a").unwrap();

        assert_eq!(store.list_memories(None).unwrap().len(), 1);
        assert_eq!(
            store.list_memories(Some(MemoryKind::History)).unwrap().len(),
            1
        );
        assert!(store.list_memories(Some(MemoryKind::Memory)).unwrap().is_empty());
    }

    #[test]
    fn test_prune_history_drops_deleted_and_old() {
        let store = storage();
        store
            .upsert_memory(&MemoryRecord::new(MemoryKind::Memory, "keep", "live fact"))
            .unwrap();
        store
            .upsert_memory(&MemoryRecord::new(MemoryKind::Memory, "gone", "deleted fact"))
            .unwrap();
        store.soft_delete_memory("gone").unwrap();
        store
            .upsert_memory(&MemoryRecord::new(MemoryKind::History, "recent", "new summary"))
            .unwrap();

        // Only the soft-deleted record goes; recent history survives.
        let removed = store.prune_history(30).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_memory_by_key("keep").unwrap().is_some());
        assert!(store.get_memory_by_key("recent").unwrap().is_some());
        assert!(store.get_memory_by_key("gone").unwrap().is_none());

        // With a zero-day horizon the history summary goes too.
        std::thread::sleep(std::time::Duration::from_millis(5));
        let removed = store.prune_history(0).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_memory_by_key("recent").unwrap().is_none());
    }

    #[test]
    fn test_skill_crud() {
        let store = storage();
        let id = store
            .create_skill(&SkillRecord::new("summarize", "Summarize the text.").always_on())
            .unwrap();

        let mut skill = store.get_skill(id).unwrap().unwrap();
        assert!(skill.always_on);

        skill.prompt = "Summarize briefly.".to_string();
        store.update_skill(&skill).unwrap();
        assert_eq!(
            store.get_skill(id).unwrap().unwrap().prompt,
            "Summarize briefly."
        );

        assert_eq!(store.list_skills().unwrap().len(), 1);
        assert!(store.delete_skill(id).unwrap());
        assert!(store.get_skill(id).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_skill_is_not_found() {
        let store = storage();
        let mut skill = SkillRecord::new("ghost", "prompt");
        skill.id = 999;
        assert!(matches!(
            store.update_skill(&skill),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_task_crud() {
        let store = storage();
        store
            .create_task(&TaskRecord::new("daily", "0 9 * * *", "good morning"))
            .unwrap();

        let tasks = store.list_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].cron_expr, "0 9 * * *");

        assert!(store.delete_task("daily").unwrap());
        assert!(!store.delete_task("daily").unwrap());
    }

    #[test]
    fn test_config_blobs() {
        let store = storage();
        let value = serde_json::json!({"enabled": true, "path": "/webhook"});
        store.set_channel_config("webhook", &value).unwrap();
        assert_eq!(store.get_channel_config("webhook").unwrap(), Some(value));
        assert_eq!(store.get_channel_config("missing").unwrap(), None);

        let value = serde_json::json!({"model": "gpt-4o"});
        store.set_provider_config("openai", &value).unwrap();
        assert_eq!(store.get_provider_config("openai").unwrap(), Some(value));
    }

    #[test]
    fn test_set_last_consolidated() {
        let store = storage();
        let session = store.get_or_create_session("rest", "c", "u").unwrap();
        store.set_last_consolidated(session.id, 42).unwrap();
        assert_eq!(
            store.get_session(session.id).unwrap().unwrap().last_consolidated,
            42
        );
        assert!(store.set_last_consolidated(999, 1).is_err());
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("magpie.db");
        {
            let store = SqliteStorage::open(&path).unwrap();
            store.get_or_create_session("rest", "c", "u").unwrap();
        }
        let store = SqliteStorage::open(&path).unwrap();
        assert_eq!(store.list_sessions().unwrap().len(), 1);
    }
}
