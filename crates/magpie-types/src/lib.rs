//! Shared types for the Magpie agent runtime.
//!
//! Everything that crosses a crate boundary lives here: chat messages in the
//! provider wire shape, bus events, and the records owned by the storage
//! port.

pub mod event;
pub mod memory;
pub mod message;
pub mod record;

pub use event::{InboundMessage, OutboundKind, OutboundMessage, meta_keys};
pub use memory::{MemoryKind, MemoryRecord};
pub use message::{ChatMessage, FunctionCall, Role, ToolCall};
pub use record::{SessionRecord, SkillRecord, StoredMessage, TaskRecord};

/// Opaque identifier used for messages and events.
pub type Id = uuid::Uuid;

/// UTC timestamp used throughout the system.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh random identifier.
pub fn new_id() -> Id {
    uuid::Uuid::new_v4()
}

/// The current UTC time.
pub fn now() -> Timestamp {
    chrono::Utc::now()
}
