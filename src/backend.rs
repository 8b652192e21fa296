//! HTTP client for the task API, used by the bot.
//!
//! Stateless wrapper over the REST surface. Task lookup by id is derived by
//! filtering the owner's task list client-side, so a task can never be read
//! or mutated through a chat that does not own it. All calls are bounded by
//! a request timeout and surface a [`BackendError`] the dialog engine turns
//! into a flash message instead of a crash.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Request timeout for every backend call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

/// Failures of backend calls. Callers convert these into flash messages.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("task not found")]
    NotFound,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Task as represented by the REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub is_notified: bool,
}

/// Single-field edits issued from the edit flows.
#[derive(Debug, Clone, Default)]
pub struct TaskFields {
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryDto {
    id: i64,
    name: String,
}

/// Case-insensitive category lookup. Unicode fold, not ASCII-only, so
/// "покупки" matches an existing "Покупки".
fn match_category(categories: &[CategoryDto], name: &str) -> Option<i64> {
    let folded = name.to_lowercase();
    categories
        .iter()
        .find(|c| c.name.to_lowercase() == folded)
        .map(|c| c.id)
}

/// Task-store operations the dialog engine depends on, mockable in tests.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Tasks owned by the given chat.
    async fn list_tasks(&self, chat_id: &str) -> BackendResult<Vec<TaskDto>>;

    /// A single task, if it exists and belongs to the chat. Derived from
    /// the owner's list, never a direct id lookup.
    async fn get_task(&self, chat_id: &str, task_id: i64) -> BackendResult<Option<TaskDto>> {
        Ok(self
            .list_tasks(chat_id)
            .await?
            .into_iter()
            .find(|t| t.id == task_id))
    }

    /// Create a task for the chat. The category is resolved (or created)
    /// by name at submission time.
    async fn create_task(
        &self,
        chat_id: &str,
        title: &str,
        category_name: &str,
        due_date: NaiveDateTime,
    ) -> BackendResult<()>;

    /// Patch the given fields of a chat-owned task.
    async fn update_task(
        &self,
        chat_id: &str,
        task_id: i64,
        fields: TaskFields,
    ) -> BackendResult<()>;

    /// Delete a chat-owned task.
    async fn delete_task(&self, chat_id: &str, task_id: i64) -> BackendResult<()>;
}

/// reqwest-backed implementation talking to the taskgram API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client for the API at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/api/tasks", self.base_url)
    }

    fn task_url(&self, id: i64) -> String {
        format!("{}/api/tasks/{id}", self.base_url)
    }

    fn categories_url(&self) -> String {
        format!("{}/api/categories", self.base_url)
    }

    async fn check(response: reqwest::Response) -> BackendResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Resolve a category id by case-insensitive name match, creating the
    /// category if no match exists.
    async fn get_or_create_category(&self, name: &str) -> BackendResult<i64> {
        let name = name.trim();
        let response = Self::check(self.client.get(self.categories_url()).send().await?).await?;
        let categories: Vec<CategoryDto> = response.json().await?;
        if let Some(id) = match_category(&categories, name) {
            return Ok(id);
        }
        let response = Self::check(
            self.client
                .post(self.categories_url())
                .json(&json!({ "name": name }))
                .send()
                .await?,
        )
        .await?;
        let created: CategoryDto = response.json().await?;
        tracing::debug!("created category '{}' with id {}", created.name, created.id);
        Ok(created.id)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_tasks(&self, chat_id: &str) -> BackendResult<Vec<TaskDto>> {
        let response = Self::check(
            self.client
                .get(self.tasks_url())
                .query(&[("telegram_id", chat_id)])
                .send()
                .await?,
        )
        .await?;
        Ok(response.json().await?)
    }

    async fn create_task(
        &self,
        chat_id: &str,
        title: &str,
        category_name: &str,
        due_date: NaiveDateTime,
    ) -> BackendResult<()> {
        let category_id = self.get_or_create_category(category_name).await?;
        let payload = json!({
            "title": title,
            "category_id": category_id,
            "telegram_id": chat_id,
            "due_date": due_date,
        });
        Self::check(
            self.client
                .post(self.tasks_url())
                .json(&payload)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn update_task(
        &self,
        chat_id: &str,
        task_id: i64,
        fields: TaskFields,
    ) -> BackendResult<()> {
        // Ownership check before touching the task.
        if self.get_task(chat_id, task_id).await?.is_none() {
            return Err(BackendError::NotFound);
        }
        let mut payload = serde_json::Map::new();
        if let Some(title) = fields.title {
            payload.insert("title".to_string(), json!(title));
        }
        if let Some(category_name) = fields.category_name {
            let category_id = self.get_or_create_category(&category_name).await?;
            payload.insert("category_id".to_string(), json!(category_id));
        }
        if let Some(due_date) = fields.due_date {
            payload.insert("due_date".to_string(), json!(due_date));
        }
        Self::check(
            self.client
                .patch(self.task_url(task_id))
                .json(&payload)
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    async fn delete_task(&self, chat_id: &str, task_id: i64) -> BackendResult<()> {
        if self.get_task(chat_id, task_id).await?.is_none() {
            return Err(BackendError::NotFound);
        }
        Self::check(self.client.delete(self.task_url(task_id)).send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let backend = HttpBackend::new("http://backend:8000/");
        assert_eq!(backend.tasks_url(), "http://backend:8000/api/tasks");
        assert_eq!(backend.task_url(7), "http://backend:8000/api/tasks/7");
        assert_eq!(
            backend.categories_url(),
            "http://backend:8000/api/categories"
        );
    }

    #[test]
    fn category_match_folds_unicode_case() {
        let categories = vec![
            CategoryDto {
                id: 1,
                name: "Покупки".to_string(),
            },
            CategoryDto {
                id: 2,
                name: "Work".to_string(),
            },
        ];
        assert_eq!(match_category(&categories, "покупки"), Some(1));
        assert_eq!(match_category(&categories, "ПОКУПКИ"), Some(1));
        assert_eq!(match_category(&categories, "work"), Some(2));
        assert_eq!(match_category(&categories, "Errands"), None);
    }

    #[test]
    fn task_dto_parses_api_shape() {
        let raw = serde_json::json!({
            "id": 42,
            "user": 7,
            "title": "Buy milk",
            "category": { "id": 1, "name": "Shopping" },
            "category_name": "Shopping",
            "created_at": "2024-12-01T10:00:00Z",
            "due_date": "2024-12-25T14:30:00",
            "is_notified": false,
            "notification_sent_at": null
        });
        let dto: TaskDto = serde_json::from_value(raw).unwrap();
        assert_eq!(dto.id, 42);
        assert_eq!(dto.category_name.as_deref(), Some("Shopping"));
        assert_eq!(
            dto.due_date.unwrap().format("%d.%m.%Y %H:%M").to_string(),
            "25.12.2024 14:30"
        );
    }
}
