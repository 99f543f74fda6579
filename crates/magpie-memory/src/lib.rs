//! Conversation consolidation.
//!
//! Tracks per-session message counters and, when a threshold is crossed,
//! folds the recent transcript into a `history` memory so long sessions
//! keep a compact long-term trace. A background pruner drops stale
//! summaries and soft-deleted records.

pub mod consolidator;

pub use consolidator::{Consolidator, ConsolidatorConfig, run_pruner, summarize};
