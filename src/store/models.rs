//! Entities persisted by the task store.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a category name.
pub const CATEGORY_NAME_MAX: usize = 100;

/// Maximum length of a task title.
pub const TASK_TITLE_MAX: usize = 255;

/// Prefix of usernames synthesized from a Telegram chat id.
pub const TELEGRAM_USERNAME_PREFIX: &str = "tg_";

/// An owner of tasks, keyed by a synthesized `tg_<chat-id>` username.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

/// A task category. Referenced, never owned, by tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// A task row joined with its owner and optional category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub title: String,
    pub category: Option<Category>,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<NaiveDateTime>,
    pub is_notified: bool,
    pub notification_sent_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Category name, if any.
    pub fn category_name(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.name.as_str())
    }
}

/// Fields accepted when creating a task.
///
/// Exactly one of `user_id` / `telegram_id` must identify the owner; a
/// `telegram_id` resolves (or lazily creates) the `tg_<chat-id>` user.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub user_id: Option<i64>,
    pub telegram_id: Option<String>,
    pub category_id: Option<i64>,
    pub due_date: Option<NaiveDateTime>,
}

/// Partial update of a task. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub category_id: Option<i64>,
    pub due_date: Option<NaiveDateTime>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.category_id.is_none() && self.due_date.is_none()
    }
}

/// Build the synthesized username for a Telegram chat id.
pub fn telegram_username(telegram_id: &str) -> String {
    format!("{TELEGRAM_USERNAME_PREFIX}{telegram_id}")
}

/// Extract the chat id back out of a `tg_<digits>` username.
///
/// Returns `None` for usernames that were not synthesized from a chat id,
/// which the notification sweep treats as "skip and retry later".
pub fn chat_id_from_username(username: &str) -> Option<&str> {
    let digits = username.strip_prefix(TELEGRAM_USERNAME_PREFIX)?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}
