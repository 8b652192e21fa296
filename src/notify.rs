//! Due-task notification sweep.
//!
//! Runs on a fixed schedule, finds tasks whose deadline has passed and that
//! have not been notified, delivers a reminder per task, and commits the
//! `is_notified` flag only after a confirmed send. One task's failure never
//! aborts the rest of the run; failed or skipped tasks are retried on every
//! subsequent sweep until they succeed or stop being due.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::store::{chat_id_from_username, SharedTaskStore, Task};
use crate::telegram::{InlineKeyboard, TelegramClient};

/// Callback data of the reminder acknowledgement button.
pub const NOTIFICATION_ACK: &str = "notification_ok";

/// Outbound message boundary, mockable in tests.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver `text` to `chat_id`. Returns `true` only on confirmed
    /// delivery; any transport failure or non-2xx response is `false`.
    async fn send(&self, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboard>) -> bool;
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send(&self, chat_id: &str, text: &str, keyboard: Option<&InlineKeyboard>) -> bool {
        self.send_message(chat_id, text, keyboard).await
    }
}

/// Human-readable reminder card for a due task.
fn reminder_text(task: &Task) -> String {
    let due = task
        .due_date
        .map(|d| d.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let category = task.category_name().unwrap_or("no category");
    format!(
        "🔔 Task reminder\n\n📝 Title: {}\n📁 Category: {}\n📅 Due: {}",
        task.title, category, due
    )
}

/// Run one sweep: notify every due, unnotified task.
///
/// Returns the number of tasks successfully notified in this run. The
/// conditional `mark_notified` write keeps overlapping runs from double
/// counting; duplicate delivery inside that race window is tolerated.
pub async fn run_sweep(store: &SharedTaskStore, messenger: &dyn Messenger) -> usize {
    let now = Utc::now();
    let due_tasks = match store.due_unnotified(now.naive_utc()) {
        Ok(tasks) => tasks,
        Err(e) => {
            tracing::error!("sweep aborted, could not query due tasks: {e}");
            return 0;
        }
    };

    let mut notified = 0;
    for task in due_tasks {
        let Some(chat_id) = chat_id_from_username(&task.username) else {
            tracing::info!(
                "skipping notification: user {} has no Telegram chat id in username",
                task.username
            );
            continue;
        };

        let keyboard = InlineKeyboard::single("✅ OK", NOTIFICATION_ACK);
        let text = reminder_text(&task);
        if !messenger.send(chat_id, &text, Some(&keyboard)).await {
            // Left unnotified on purpose; retried next run.
            tracing::warn!(
                "notification delivery failed | task_id={} user={}",
                task.id,
                task.username
            );
            continue;
        }

        match store.mark_notified(task.id, now) {
            Ok(true) => {
                tracing::info!(
                    "notification sent | task_id={} user={} title={} due_date={}",
                    task.id,
                    task.username,
                    task.title,
                    task.due_date.map(|d| d.to_string()).unwrap_or_default()
                );
                notified += 1;
            }
            Ok(false) => {
                // A concurrent run won the conditional write.
                tracing::debug!("task {} already marked notified", task.id);
            }
            Err(e) => {
                tracing::warn!("failed to mark task {} notified: {e}", task.id);
            }
        }
    }
    notified
}

/// Run the sweep forever at a fixed interval. Spawned from the API binary.
pub async fn sweep_loop(store: SharedTaskStore, messenger: Arc<dyn Messenger>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let notified = run_sweep(&store, messenger.as_ref()).await;
        if notified > 0 {
            tracing::info!("sweep finished, {notified} notification(s) sent");
        } else {
            tracing::debug!("sweep finished, nothing to notify");
        }
    }
}
