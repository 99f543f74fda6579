//! Per-session consolidation counters and the heuristic summarizer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use magpie_storage::{Result, Storage};
use magpie_types::{MemoryKind, MemoryRecord, Role, StoredMessage};

/// How many trailing messages a consolidation pass reads.
const CONSOLIDATION_FETCH: usize = 100;

/// Configuration for the consolidator.
#[derive(Debug, Clone)]
pub struct ConsolidatorConfig {
    /// Messages per session before a consolidation pass runs.
    pub threshold: usize,
    /// History memories older than this many days are pruned.
    pub max_age_days: i64,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            threshold: 50,
            max_age_days: 30,
        }
    }
}

/// Tracks message counts per session and produces summary records.
///
/// Counters are in-memory only: a restart starts counting from zero,
/// which at worst delays the next consolidation by one threshold.
pub struct Consolidator {
    config: ConsolidatorConfig,
    counters: Mutex<HashMap<i64, usize>>,
}

impl Consolidator {
    pub fn new(config: ConsolidatorConfig) -> Self {
        Self {
            config: ConsolidatorConfig {
                threshold: config.threshold.max(1),
                ..config
            },
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Record one processed message for a session and return the new count.
    pub fn increment_message_count(&self, session_id: i64) -> usize {
        let mut counters = self.counters.lock();
        let count = counters.entry(session_id).or_insert(0);
        *count += 1;
        *count
    }

    /// Whether the session has crossed the consolidation threshold.
    pub fn should_consolidate(&self, session_id: i64) -> bool {
        self.counters
            .lock()
            .get(&session_id)
            .is_some_and(|count| *count >= self.config.threshold)
    }

    /// Current counter value, for observability.
    pub fn message_count(&self, session_id: i64) -> usize {
        self.counters.lock().get(&session_id).copied().unwrap_or(0)
    }

    /// Fold the session's recent transcript into a `history` memory and
    /// reset the counter.
    pub fn consolidate(&self, storage: &dyn Storage, session_id: i64) -> Result<()> {
        let messages = storage.recent_messages(session_id, CONSOLIDATION_FETCH)?;
        if messages.is_empty() {
            self.counters.lock().remove(&session_id);
            return Ok(());
        }

        let summary = summarize(&messages);
        let record = MemoryRecord::new(
            MemoryKind::History,
            format!("summary_{}", session_id),
            summary,
        )
        .for_session(session_id);
        storage.upsert_memory(&record)?;

        let last_id = messages.last().map(|m| m.id).unwrap_or(0);
        storage.set_last_consolidated(session_id, last_id)?;

        self.counters.lock().remove(&session_id);

        tracing::debug!(
            session_id,
            messages = messages.len(),
            "Session consolidated into history memory"
        );
        Ok(())
    }
}

/// Heuristic transcript summary: role counts plus sampled user lines.
///
/// No model call happens here. Anything that captures the gist is
/// enough for the long-term trace.
pub fn summarize(messages: &[StoredMessage]) -> String {
    let mut users = 0usize;
    let mut assistants = 0usize;
    let mut tools = 0usize;
    for msg in messages {
        match msg.role {
            Role::User => users += 1,
            Role::Assistant => assistants += 1,
            Role::Tool => tools += 1,
            Role::System => {}
        }
    }

    let mut summary = format!(
        "Conversation of {} messages ({} user, {} assistant, {} tool results).",
        messages.len(),
        users,
        assistants,
        tools
    );

    let user_lines: Vec<&StoredMessage> = messages
        .iter()
        .filter(|m| m.role == Role::User && !m.content.trim().is_empty())
        .collect();
    if let Some(first) = user_lines.first() {
        summary.push_str(&format!("\nStarted with: {}", sample(&first.content)));
    }
    if user_lines.len() > 1
        && let Some(last) = user_lines.last()
    {
        summary.push_str(&format!("\nMost recently: {}", sample(&last.content)));
    }

    summary
}

/// First line of a message, clipped to keep summaries compact.
fn sample(content: &str) -> String {
    const MAX: usize = 120;
    let line = content.lines().next().unwrap_or("");
    if line.len() <= MAX {
        return line.to_string();
    }
    let mut cut = MAX;
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &line[..cut])
}

/// Background task dropping stale history and soft-deleted memories.
///
/// Runs once per `interval` until cancelled.
pub async fn run_pruner(
    storage: Arc<dyn Storage>,
    max_age_days: i64,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        match storage.prune_history(max_age_days) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "Pruned history memories"),
            Err(e) => tracing::warn!(error = %e, "History pruning failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
