//! Cron scheduler for Magpie.
//!
//! Evaluates stored task schedules once per minute and publishes a
//! synthetic inbound message for every task that is due, letting the
//! regular agent worker pick it up like any other channel.

pub mod cron;

pub use cron::{CronError, CronExpr};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio_util::sync::CancellationToken;

use magpie_bus::MessageBus;
use magpie_storage::Storage;
use magpie_types::{InboundMessage, TaskRecord};

/// User id attached to scheduler-originated messages.
const SCHEDULER_USER: &str = "scheduler";

/// Tasks due at the given minute.
///
/// Tasks with unparseable expressions are skipped with a warning rather
/// than failing the tick.
pub fn due_tasks(tasks: &[TaskRecord], now: DateTime<Utc>) -> Vec<&TaskRecord> {
    tasks
        .iter()
        .filter(|task| {
            if !task.enabled {
                return false;
            }
            match CronExpr::parse(&task.cron_expr) {
                Ok(cron) => cron.matches(now),
                Err(e) => {
                    tracing::warn!(task = %task.name, error = %e, "Skipping task with bad cron expression");
                    false
                }
            }
        })
        .collect()
}

/// Build the synthetic inbound message for a fired task.
pub fn task_message(task: &TaskRecord) -> InboundMessage {
    InboundMessage::new(&task.channel, &task.chat_id, SCHEDULER_USER, &task.message)
        .with_meta("task", task.name.clone())
}

/// Run the scheduler loop until cancelled.
///
/// Ticks are aligned to minute boundaries; each tick re-reads the task
/// table so additions and removals take effect without a restart.
pub async fn run_scheduler(
    storage: Arc<dyn Storage>,
    bus: Arc<MessageBus>,
    cancel: CancellationToken,
) {
    loop {
        let wait = until_next_minute(Utc::now());
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Utc::now();
        let tasks = match storage.list_tasks() {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load scheduled tasks");
                continue;
            }
        };

        for task in due_tasks(&tasks, now) {
            tracing::info!(task = %task.name, "Scheduled task fired");
            if let Err(e) = bus.publish_inbound(task_message(task)) {
                tracing::warn!(task = %task.name, error = %e, "Failed to publish scheduled message");
            }
        }
    }
}

/// Duration until the next minute boundary (never zero).
fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = now.second() as u64 * 1_000 + now.timestamp_subsec_millis() as u64;
    Duration::from_millis(60_000u64.saturating_sub(into_minute).max(1))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(name: &str, expr: &str, enabled: bool) -> TaskRecord {
        let mut task = TaskRecord::new(name, expr, format!("run {}", name));
        task.enabled = enabled;
        task
    }

    #[test]
    fn test_due_tasks_filters() {
        let nine = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();
        let tasks = vec![
            task("morning", "0 9 * * *", true),
            task("evening", "0 21 * * *", true),
            task("disabled", "0 9 * * *", false),
            task("broken", "not a cron", true),
        ];

        let due = due_tasks(&tasks, nine);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "morning");
    }

    #[test]
    fn test_task_message_shape() {
        let task = task("morning", "0 9 * * *", true);
        let msg = task_message(&task);
        assert_eq!(msg.channel, "cron");
        assert_eq!(msg.chat_id, "cron");
        assert_eq!(msg.user_id, SCHEDULER_USER);
        assert_eq!(msg.content, "run morning");
        assert_eq!(msg.metadata["task"], serde_json::json!("morning"));
    }

    #[test]
    fn test_until_next_minute() {
        let t = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 45).unwrap();
        let wait = until_next_minute(t);
        assert!(wait <= Duration::from_secs(15));
        assert!(wait >= Duration::from_secs(14));

        let boundary = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();
        assert_eq!(until_next_minute(boundary), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_scheduler_publishes_due_task() {
        use magpie_storage::SqliteStorage;

        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        storage
            .create_task(&TaskRecord::new("tick", "* * * * *", "heartbeat"))
            .unwrap();
        let bus = Arc::new(MessageBus::new());

        // Drive one tick directly instead of waiting for a real minute.
        let tasks = storage.list_tasks().unwrap();
        for task in due_tasks(&tasks, Utc::now()) {
            bus.publish_inbound(task_message(task)).unwrap();
        }

        let msg = bus
            .consume_inbound(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(msg.content, "heartbeat");
        assert_eq!(msg.channel, "cron");
    }
}
