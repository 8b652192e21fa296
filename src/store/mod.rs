//! Relational task store on SQLite.
//!
//! Owns the `users`, `categories` and `tasks` tables. Primary keys come
//! from the injected [`IdGenerator`], never from a database sequence.
//! Referential rules match the domain: deleting a user cascades to its
//! tasks, deleting a category nulls the reference and the task survives.

pub mod models;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::idgen::IdGenerator;
pub use models::{
    chat_id_from_username, telegram_username, Category, NewTask, Task, TaskPatch, User,
    CATEGORY_NAME_MAX, TASK_TITLE_MAX,
};

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("not found")]
    NotFound,
}

pub type StoreResult<T> = Result<T, StoreError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY,
    username    TEXT NOT NULL UNIQUE,
    first_name  TEXT NOT NULL DEFAULT '',
    last_name   TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS categories (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS tasks (
    id                    INTEGER PRIMARY KEY,
    user_id               INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title                 TEXT NOT NULL,
    category_id           INTEGER REFERENCES categories(id) ON DELETE SET NULL,
    created_at            TEXT NOT NULL,
    due_date              TEXT,
    is_notified           INTEGER NOT NULL DEFAULT 0,
    notification_sent_at  TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id);
CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks(due_date) WHERE is_notified = 0;
";

const TASK_SELECT: &str = "
SELECT t.id, t.user_id, u.username, t.title,
       t.category_id, c.name,
       t.created_at, t.due_date, t.is_notified, t.notification_sent_at
FROM tasks t
JOIN users u ON u.id = t.user_id
LEFT JOIN categories c ON c.id = t.category_id
";

// Fixed-width ISO layout so lexicographic TEXT comparison in SQL matches
// chronological order.
const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn encode_naive(value: &NaiveDateTime) -> String {
    value.format(NAIVE_FORMAT).to_string()
}

fn decode_naive(value: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, NAIVE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn encode_utc(value: &DateTime<Utc>) -> String {
    encode_naive(&value.naive_utc())
}

fn decode_utc(value: &str) -> rusqlite::Result<DateTime<Utc>> {
    decode_naive(value).map(|naive| Utc.from_utc_datetime(&naive))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// SQLite-backed store shared across request handlers and the sweep.
///
/// rusqlite connections are not Sync, so all access funnels through a
/// mutex; every operation is a short statement and never holds the lock
/// across I/O outside SQLite itself.
#[derive(Debug)]
pub struct TaskStore {
    conn: Mutex<Connection>,
    ids: Arc<IdGenerator>,
}

/// Shared store handle.
pub type SharedTaskStore = Arc<TaskStore>;

impl TaskStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>, ids: Arc<IdGenerator>) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?, ids)
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory(ids: Arc<IdGenerator>) -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, ids)
    }

    fn from_connection(conn: Connection, ids: Arc<IdGenerator>) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Raw connection access for test fixtures.
    #[cfg(test)]
    pub(crate) fn lock_for_test<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        f(&self.lock())
    }

    // ── Users ────────────────────────────────────────────────────────────

    /// Resolve the user for a Telegram chat id, creating it on first use.
    ///
    /// Idempotent: the synthesized username is unique, so repeated calls
    /// for the same chat id always yield the same row.
    pub fn get_or_create_user(&self, telegram_id: &str) -> StoreResult<User> {
        let username = telegram_username(telegram_id);
        let conn = self.lock();
        if let Some(user) = Self::find_user(&conn, &username)? {
            return Ok(user);
        }
        let user = User {
            id: self.ids.generate(),
            username: username.clone(),
            first_name: "Telegram".to_string(),
            last_name: telegram_id.to_string(),
        };
        conn.execute(
            "INSERT INTO users (id, username, first_name, last_name) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.username, user.first_name, user.last_name],
        )?;
        Ok(user)
    }

    fn find_user(conn: &Connection, username: &str) -> StoreResult<Option<User>> {
        let user = conn
            .query_row(
                "SELECT id, username, first_name, last_name FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        first_name: row.get(2)?,
                        last_name: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    /// Delete a user; tasks cascade away with it.
    pub fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ── Categories ───────────────────────────────────────────────────────

    pub fn create_category(&self, name: &str) -> StoreResult<Category> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > CATEGORY_NAME_MAX {
            return Err(StoreError::Validation(format!(
                "category name must be 1..={CATEGORY_NAME_MAX} characters"
            )));
        }
        let category = Category {
            id: self.ids.generate(),
            name: name.to_string(),
        };
        self.lock()
            .execute(
                "INSERT INTO categories (id, name) VALUES (?1, ?2)",
                params![category.id, category.name],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("category '{name}'"))
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
        Ok(category)
    }

    pub fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_category(&self, id: i64) -> StoreResult<Option<Category>> {
        let category = self
            .lock()
            .query_row(
                "SELECT id, name FROM categories WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Category {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(category)
    }

    pub fn rename_category(&self, id: i64, name: &str) -> StoreResult<Category> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > CATEGORY_NAME_MAX {
            return Err(StoreError::Validation(format!(
                "category name must be 1..={CATEGORY_NAME_MAX} characters"
            )));
        }
        let changed = self
            .lock()
            .execute(
                "UPDATE categories SET name = ?2 WHERE id = ?1",
                params![id, name],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("category '{name}'"))
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(Category {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a category. Referencing tasks survive with a null category.
    pub fn delete_category(&self, id: i64) -> StoreResult<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM categories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ── Tasks ────────────────────────────────────────────────────────────

    /// Create a task. The owner comes from `user_id` or is lazily resolved
    /// from `telegram_id`; providing neither is a validation error.
    pub fn create_task(&self, new: NewTask) -> StoreResult<Task> {
        let title = new.title.trim();
        if title.is_empty() || title.chars().count() > TASK_TITLE_MAX {
            return Err(StoreError::Validation(format!(
                "title must be 1..={TASK_TITLE_MAX} characters"
            )));
        }
        let user = match (new.user_id, new.telegram_id.as_deref()) {
            (Some(id), _) => {
                let conn = self.lock();
                conn.query_row(
                    "SELECT id, username, first_name, last_name FROM users WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(User {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            first_name: row.get(2)?,
                            last_name: row.get(3)?,
                        })
                    },
                )
                .optional()?
                .ok_or(StoreError::NotFound)?
            }
            (None, Some(telegram_id)) => self.get_or_create_user(telegram_id)?,
            (None, None) => {
                return Err(StoreError::Validation(
                    "either `user` or `telegram_id` must be provided".to_string(),
                ))
            }
        };

        let category = match new.category_id {
            Some(id) => Some(self.get_category(id)?.ok_or(StoreError::NotFound)?),
            None => None,
        };

        let task = Task {
            id: self.ids.generate(),
            user_id: user.id,
            username: user.username,
            title: title.to_string(),
            category,
            // Whole seconds only: the column stores fixed-width ISO text, so
            // the value handed back here must round-trip through a read.
            created_at: Utc::now().trunc_subsecs(0),
            due_date: new.due_date,
            is_notified: false,
            notification_sent_at: None,
        };
        self.lock().execute(
            "INSERT INTO tasks (id, user_id, title, category_id, created_at, due_date, is_notified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                task.id,
                task.user_id,
                task.title,
                task.category.as_ref().map(|c| c.id),
                encode_utc(&task.created_at),
                task.due_date.as_ref().map(encode_naive),
            ],
        )?;
        Ok(task)
    }

    fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
        let category = match row.get::<_, Option<i64>>(4)? {
            Some(id) => Some(Category {
                id,
                name: row.get(5)?,
            }),
            None => None,
        };
        Ok(Task {
            id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            title: row.get(3)?,
            category,
            created_at: decode_utc(&row.get::<_, String>(6)?)?,
            due_date: row
                .get::<_, Option<String>>(7)?
                .map(|v| decode_naive(&v))
                .transpose()?,
            is_notified: row.get::<_, i64>(8)? != 0,
            notification_sent_at: row
                .get::<_, Option<String>>(9)?
                .map(|v| decode_utc(&v))
                .transpose()?,
        })
    }

    /// List tasks, optionally narrowed to one Telegram chat's owner.
    ///
    /// The filter is an exact match on the synthesized `tg_<chat-id>`
    /// username, never a substring match.
    pub fn list_tasks(&self, telegram_id: Option<&str>) -> StoreResult<Vec<Task>> {
        let conn = self.lock();
        match telegram_id {
            Some(telegram_id) => {
                let sql = format!("{TASK_SELECT} WHERE u.username = ?1 ORDER BY t.id");
                let mut stmt = conn.prepare(&sql)?;
                let tasks = stmt
                    .query_map(params![telegram_username(telegram_id)], Self::task_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(tasks)
            }
            None => {
                let sql = format!("{TASK_SELECT} ORDER BY t.id");
                let mut stmt = conn.prepare(&sql)?;
                let tasks = stmt
                    .query_map([], Self::task_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(tasks)
            }
        }
    }

    pub fn get_task(&self, id: i64) -> StoreResult<Option<Task>> {
        let conn = self.lock();
        let sql = format!("{TASK_SELECT} WHERE t.id = ?1");
        let task = conn
            .query_row(&sql, params![id], Self::task_from_row)
            .optional()?;
        Ok(task)
    }

    /// Apply a partial update; absent fields stay untouched.
    pub fn update_task(&self, id: i64, patch: TaskPatch) -> StoreResult<Task> {
        if let Some(title) = patch.title.as_deref() {
            let title = title.trim();
            if title.is_empty() || title.chars().count() > TASK_TITLE_MAX {
                return Err(StoreError::Validation(format!(
                    "title must be 1..={TASK_TITLE_MAX} characters"
                )));
            }
        }
        if let Some(category_id) = patch.category_id {
            if self.get_category(category_id)?.is_none() {
                return Err(StoreError::NotFound);
            }
        }
        {
            let conn = self.lock();
            if let Some(title) = patch.title.as_deref() {
                conn.execute(
                    "UPDATE tasks SET title = ?2 WHERE id = ?1",
                    params![id, title.trim()],
                )?;
            }
            if let Some(category_id) = patch.category_id {
                conn.execute(
                    "UPDATE tasks SET category_id = ?2 WHERE id = ?1",
                    params![id, category_id],
                )?;
            }
            if let Some(due_date) = patch.due_date.as_ref() {
                conn.execute(
                    "UPDATE tasks SET due_date = ?2 WHERE id = ?1",
                    params![id, encode_naive(due_date)],
                )?;
            }
        }
        self.get_task(id)?.ok_or(StoreError::NotFound)
    }

    pub fn delete_task(&self, id: i64) -> StoreResult<bool> {
        let changed = self
            .lock()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ── Notification sweep support ───────────────────────────────────────

    /// Tasks whose due date has passed and that have not been notified yet.
    pub fn due_unnotified(&self, now: NaiveDateTime) -> StoreResult<Vec<Task>> {
        let conn = self.lock();
        let sql = format!(
            "{TASK_SELECT} WHERE t.due_date IS NOT NULL AND t.due_date <= ?1 \
             AND t.is_notified = 0 ORDER BY t.due_date"
        );
        let mut stmt = conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![encode_naive(&now)], Self::task_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Conditionally mark a task notified.
    ///
    /// The `is_notified = 0` guard is the sole serialization point between
    /// overlapping sweep runs: only one of them observes `true` here.
    pub fn mark_notified(&self, id: i64, now: DateTime<Utc>) -> StoreResult<bool> {
        let changed = self.lock().execute(
            "UPDATE tasks SET is_notified = 1, notification_sent_at = ?2 \
             WHERE id = ?1 AND is_notified = 0",
            params![id, encode_utc(&now)],
        )?;
        Ok(changed == 1)
    }
}
