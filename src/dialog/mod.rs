//! Per-chat dialog engine for the Telegram front end.
//!
//! Each chat owns an in-memory [`Session`] holding the current state, the
//! scratch data of an in-progress creation flow, and an optional one-shot
//! flash message. Transitions form an explicit table: a single match over
//! `(state, event)` pairs, with unlisted pairs (stale buttons, text in a
//! button-only window) leaving the session untouched. Button presses
//! transition deterministically; free-text
//! input in the date/time states is validated and re-prompts in place on
//! failure without touching scratch data.
//!
//! Sessions are not persisted: they live until the process exits or the
//! user issues `/start`, which discards everything and re-enters the menu.

pub mod input;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::backend::{Backend, BackendError, TaskFields};
use crate::telegram::{InlineKeyboard, InlineKeyboardButton};

use input::{
    combine_due, format_task_card, parse_user_date, parse_user_time, truncate_label,
};

/// Maximum characters of a task title shown on a list button.
const LIST_LABEL_MAX: usize = 35;

const ERR_DATE_FORMAT: &str =
    "❌ Invalid date format. Use DD.MM.YYYY (for example: 25.12.2024)";
const ERR_TIME_FORMAT: &str = "❌ Invalid time format. Use HH:MM (for example: 14:30)";

/// Dialog states. The graph is cyclic; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogState {
    Menu,
    TasksList,
    TaskView,
    TaskEditMenu,
    DeleteConfirm,
    AddTitle,
    AddCategory,
    AddDate,
    AddTime,
    EditTitle,
    EditCategory,
    EditDate,
    EditTime,
}

/// Partial input accumulated across a multi-step flow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scratch {
    pub add_title: Option<String>,
    pub add_category: Option<String>,
    pub add_date: Option<chrono::NaiveDate>,
    /// Task currently being viewed or edited.
    pub task_id: Option<i64>,
}

/// Ephemeral per-chat dialog session.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: DialogState,
    pub scratch: Scratch,
    flash: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: DialogState::Menu,
            scratch: Scratch::default(),
            flash: None,
        }
    }
}

impl Session {
    fn set_flash(&mut self, message: impl Into<String>) {
        self.flash = Some(message.into());
    }

    /// Consume the flash: shown exactly once, then gone.
    fn take_flash(&mut self) -> Option<String> {
        self.flash.take()
    }
}

/// Buttons the dialog windows expose, parsed from callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    TasksList,
    AddTask,
    TaskSelect(i64),
    BackMenu,
    BackList,
    BackView,
    EditMenu,
    AskDelete,
    ConfirmDelete,
    CancelDelete,
    EditTitle,
    EditCategory,
    EditDate,
    EditTime,
}

impl ButtonId {
    /// Callback data carried by the inline button.
    pub fn callback_data(&self) -> String {
        match self {
            Self::TasksList => "tasks".to_string(),
            Self::AddTask => "add".to_string(),
            Self::TaskSelect(id) => format!("task:{id}"),
            Self::BackMenu => "back_menu".to_string(),
            Self::BackList => "back_list".to_string(),
            Self::BackView => "back_view".to_string(),
            Self::EditMenu => "edit".to_string(),
            Self::AskDelete => "del".to_string(),
            Self::ConfirmDelete => "confirm_del".to_string(),
            Self::CancelDelete => "cancel_del".to_string(),
            Self::EditTitle => "edit_title".to_string(),
            Self::EditCategory => "edit_cat".to_string(),
            Self::EditDate => "edit_date".to_string(),
            Self::EditTime => "edit_time".to_string(),
        }
    }

    /// Parse callback data back into a button id.
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(raw) = data.strip_prefix("task:") {
            return raw.parse().ok().map(Self::TaskSelect);
        }
        match data {
            "tasks" => Some(Self::TasksList),
            "add" => Some(Self::AddTask),
            "back_menu" => Some(Self::BackMenu),
            "back_list" => Some(Self::BackList),
            "back_view" => Some(Self::BackView),
            "edit" => Some(Self::EditMenu),
            "del" => Some(Self::AskDelete),
            "confirm_del" => Some(Self::ConfirmDelete),
            "cancel_del" => Some(Self::CancelDelete),
            "edit_title" => Some(Self::EditTitle),
            "edit_cat" => Some(Self::EditCategory),
            "edit_date" => Some(Self::EditDate),
            "edit_time" => Some(Self::EditTime),
            _ => None,
        }
    }
}

/// An event driving the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `/start`: discard the session and re-enter the menu.
    Restart,
    /// Inline button press; deterministic, no validation needed.
    Button(ButtonId),
    /// Free-text message; validated by the current state.
    Text(String),
}

/// A rendered dialog window: text plus inline keyboard.
#[derive(Debug, Clone)]
pub struct View {
    pub text: String,
    pub keyboard: InlineKeyboard,
}

fn button(label: &str, id: ButtonId) -> InlineKeyboardButton {
    InlineKeyboardButton {
        text: label.to_string(),
        callback_data: id.callback_data(),
    }
}

/// Dialog engine: session store plus transition and render logic.
///
/// Updates for one chat are handled one at a time (the polling loop is
/// sequential), so sessions are cloned out, mutated, and written back.
pub struct DialogEngine {
    backend: Arc<dyn Backend>,
    sessions: RwLock<HashMap<i64, Session>>,
}

impl DialogEngine {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Current session snapshot for a chat (tests and diagnostics).
    pub async fn session(&self, chat_id: i64) -> Session {
        self.sessions
            .read()
            .await
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Apply one event for a chat and render the resulting window.
    pub async fn handle(&self, chat_id: i64, event: Event) -> View {
        let mut session = self.session(chat_id).await;
        self.apply(chat_id, &mut session, event).await;
        let view = self.render(chat_id, &mut session).await;
        self.sessions.write().await.insert(chat_id, session);
        view
    }

    // ── Transition table ────────────────────────────────────────────────

    /// The `(state, event)` transition table.
    ///
    /// Pairs not listed leave the session untouched; the current window is
    /// simply re-rendered (stale buttons from old messages land here).
    async fn apply(&self, chat_id: i64, session: &mut Session, event: Event) {
        use ButtonId as B;
        use DialogState as S;

        let chat = chat_id.to_string();
        match (session.state, event) {
            (_, Event::Restart) => {
                *session = Session::default();
            }

            // Menu
            (S::Menu, Event::Button(B::TasksList)) => session.state = S::TasksList,
            (S::Menu, Event::Button(B::AddTask)) => {
                session.scratch.add_title = None;
                session.scratch.add_category = None;
                session.scratch.add_date = None;
                session.state = S::AddTitle;
            }

            // Tasks list
            (S::TasksList, Event::Button(B::TaskSelect(task_id))) => {
                session.scratch.task_id = Some(task_id);
                tracing::debug!("task_view | telegram_id={chat} task_id={task_id}");
                session.state = S::TaskView;
            }
            (S::TasksList, Event::Button(B::BackMenu)) => session.state = S::Menu,

            // Task view
            (S::TaskView, Event::Button(B::EditMenu)) => session.state = S::TaskEditMenu,
            (S::TaskView, Event::Button(B::AskDelete)) => session.state = S::DeleteConfirm,
            (S::TaskView, Event::Button(B::BackList)) => session.state = S::TasksList,

            // Edit menu
            (S::TaskEditMenu, Event::Button(B::EditTitle)) => session.state = S::EditTitle,
            (S::TaskEditMenu, Event::Button(B::EditCategory)) => session.state = S::EditCategory,
            (S::TaskEditMenu, Event::Button(B::EditDate)) => session.state = S::EditDate,
            (S::TaskEditMenu, Event::Button(B::EditTime)) => session.state = S::EditTime,
            (S::TaskEditMenu, Event::Button(B::BackView)) => session.state = S::TaskView,

            // Delete confirmation
            (S::DeleteConfirm, Event::Button(B::ConfirmDelete)) => {
                self.do_delete(&chat, session).await;
            }
            (S::DeleteConfirm, Event::Button(B::CancelDelete)) => session.state = S::TaskView,

            // Creation flow: title → category → date → time
            (S::AddTitle, Event::Text(text)) => {
                session.scratch.add_title = Some(text.trim().to_string());
                session.state = S::AddCategory;
            }
            (S::AddCategory, Event::Text(text)) => {
                session.scratch.add_category = Some(text.trim().to_string());
                session.state = S::AddDate;
            }
            (S::AddDate, Event::Text(text)) => match parse_user_date(&text) {
                Ok(date) => {
                    session.scratch.add_date = Some(date);
                    session.state = S::AddTime;
                }
                Err(_) => {
                    tracing::info!(
                        "validation_error | field=date telegram_id={chat} value={text}"
                    );
                    session.set_flash(ERR_DATE_FORMAT);
                }
            },
            (S::AddTime, Event::Text(text)) => match parse_user_time(&text) {
                Ok(time) => self.submit_new_task(&chat, session, time).await,
                Err(_) => {
                    tracing::info!(
                        "validation_error | field=time telegram_id={chat} value={text}"
                    );
                    session.set_flash(ERR_TIME_FORMAT);
                }
            },

            // Single-field edit flows
            (S::EditTitle, Event::Text(text)) => {
                let fields = TaskFields {
                    title: Some(text.trim().to_string()),
                    ..Default::default()
                };
                self.submit_edit(&chat, session, "title", fields, "✅ Title updated", "❌ Could not update the title")
                    .await;
            }
            (S::EditCategory, Event::Text(text)) => {
                let fields = TaskFields {
                    category_name: Some(text.trim().to_string()),
                    ..Default::default()
                };
                self.submit_edit(&chat, session, "category", fields, "✅ Category updated", "❌ Could not update the category")
                    .await;
            }
            (S::EditDate, Event::Text(text)) => match parse_user_date(&text) {
                Ok(date) => self.submit_due_edit(&chat, session, DueEdit::Date(date)).await,
                Err(_) => {
                    tracing::info!(
                        "validation_error | field=date edit telegram_id={chat} value={text}"
                    );
                    session.set_flash(ERR_DATE_FORMAT);
                }
            },
            (S::EditTime, Event::Text(text)) => match parse_user_time(&text) {
                Ok(time) => self.submit_due_edit(&chat, session, DueEdit::Time(time)).await,
                Err(_) => {
                    tracing::info!(
                        "validation_error | field=time edit telegram_id={chat} value={text}"
                    );
                    session.set_flash(ERR_TIME_FORMAT);
                }
            },

            // Anything else: stale button or text in a button-only window.
            (state, event) => {
                tracing::debug!("ignored event {event:?} in state {state:?} for chat {chat}");
            }
        }
    }

    // ── Transition effects ──────────────────────────────────────────────

    /// Final step of the creation flow: submit the accumulated scratch as
    /// one task-creation call. Success or failure, the session returns to
    /// the menu; the outcome is reported via flash.
    async fn submit_new_task(
        &self,
        chat: &str,
        session: &mut Session,
        time: chrono::NaiveTime,
    ) {
        let scratch = &session.scratch;
        let (title, category, date) = match (
            scratch.add_title.clone(),
            scratch.add_category.clone(),
            scratch.add_date,
        ) {
            (Some(title), Some(category), Some(date)) => (title, category, date),
            _ => {
                // Scratch was lost (process restart mid-flow); start over.
                session.set_flash("❌ Could not create the task");
                session.state = DialogState::Menu;
                return;
            }
        };
        let due = combine_due(date, time);
        match self.backend.create_task(chat, &title, &category, due).await {
            Ok(()) => {
                session.set_flash("✅ Task created");
                tracing::info!("task_created | telegram_id={chat} title={title} due={due}");
            }
            Err(e) => {
                session.set_flash("❌ Could not create the task");
                tracing::warn!("task_create_failed | telegram_id={chat} title={title} error={e}");
            }
        }
        session.state = DialogState::Menu;
    }

    /// Issue a single-field update and return to the task view.
    async fn submit_edit(
        &self,
        chat: &str,
        session: &mut Session,
        field: &str,
        fields: TaskFields,
        ok_flash: &str,
        err_flash: &str,
    ) {
        let Some(task_id) = session.scratch.task_id else {
            session.set_flash("❌ Task not found");
            session.state = DialogState::TasksList;
            return;
        };
        match self.backend.update_task(chat, task_id, fields).await {
            Ok(()) => {
                session.set_flash(ok_flash);
                tracing::info!("task_updated | telegram_id={chat} task_id={task_id} field={field}");
                session.state = DialogState::TaskView;
            }
            Err(BackendError::NotFound) => {
                session.set_flash("❌ Task not found");
                session.state = DialogState::TasksList;
            }
            Err(e) => {
                session.set_flash(err_flash);
                tracing::warn!(
                    "task_update_failed | telegram_id={chat} task_id={task_id} field={field} error={e}"
                );
                session.state = DialogState::TaskView;
            }
        }
    }

    /// Merge an edited date or time against the task's current due
    /// timestamp: editing the date preserves the time of day, editing the
    /// time preserves the date.
    async fn submit_due_edit(&self, chat: &str, session: &mut Session, edit: DueEdit) {
        let Some(task_id) = session.scratch.task_id else {
            session.set_flash("❌ Task not found");
            session.state = DialogState::TasksList;
            return;
        };
        let field = match edit {
            DueEdit::Date(_) => "due_date",
            DueEdit::Time(_) => "due_time",
        };
        let task = match self.backend.get_task(chat, task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                session.set_flash("❌ Task not found");
                session.state = DialogState::TasksList;
                return;
            }
            Err(e) => {
                session.set_flash("❌ Could not update the deadline");
                tracing::warn!(
                    "task_update_failed | telegram_id={chat} task_id={task_id} field={field} error={e}"
                );
                session.state = DialogState::TaskView;
                return;
            }
        };
        let base = task.due_date.unwrap_or_else(|| Utc::now().naive_utc());
        let due = match edit {
            DueEdit::Date(date) => combine_due(date, base.time()),
            DueEdit::Time(time) => combine_due(base.date(), time),
        };
        let fields = TaskFields {
            due_date: Some(due),
            ..Default::default()
        };
        let (ok_flash, err_flash) = match edit {
            DueEdit::Date(_) => ("✅ Date updated", "❌ Could not update the date"),
            DueEdit::Time(_) => ("✅ Time updated", "❌ Could not update the time"),
        };
        self.submit_edit(chat, session, field, fields, ok_flash, err_flash)
            .await;
    }

    async fn do_delete(&self, chat: &str, session: &mut Session) {
        let task_id = session.scratch.task_id;
        match task_id {
            Some(task_id) => match self.backend.delete_task(chat, task_id).await {
                Ok(()) => {
                    session.set_flash("✅ Task deleted");
                    tracing::info!("task_deleted | telegram_id={chat} task_id={task_id}");
                }
                Err(e) => {
                    session.set_flash("❌ Could not delete the task");
                    tracing::warn!(
                        "task_delete_failed | telegram_id={chat} task_id={task_id} error={e}"
                    );
                }
            },
            None => session.set_flash("❌ Task not found"),
        }
        session.state = DialogState::TasksList;
    }

    // ── Window rendering ────────────────────────────────────────────────

    /// Render the window for the session's current state. Consumes the
    /// flash. List and detail windows degrade to an empty / "not found"
    /// view when the backend is unreachable instead of failing the session.
    async fn render(&self, chat_id: i64, session: &mut Session) -> View {
        use ButtonId as B;
        use DialogState as S;

        let chat = chat_id.to_string();
        let flash = session
            .take_flash()
            .map(|f| format!("{f}\n\n"))
            .unwrap_or_default();

        match session.state {
            S::Menu => View {
                text: format!("📋 Task manager\n\n{flash}").trim_end().to_string(),
                keyboard: InlineKeyboard {
                    inline_keyboard: vec![
                        vec![button("📝 My tasks", B::TasksList)],
                        vec![button("➕ Add task", B::AddTask)],
                    ],
                },
            },

            S::TasksList => {
                let (tasks, fetch_note) = match self.backend.list_tasks(&chat).await {
                    Ok(tasks) => (tasks, String::new()),
                    Err(e) => {
                        tracing::warn!("tasks_list_failed | telegram_id={chat} error={e}");
                        (Vec::new(), "❌ Could not fetch tasks\n\n".to_string())
                    }
                };
                let mut rows: Vec<Vec<InlineKeyboardButton>> = tasks
                    .iter()
                    .map(|task| {
                        let label = if task.title.is_empty() {
                            "Untitled".to_string()
                        } else {
                            truncate_label(&task.title, LIST_LABEL_MAX)
                        };
                        vec![InlineKeyboardButton {
                            text: label,
                            callback_data: B::TaskSelect(task.id).callback_data(),
                        }]
                    })
                    .collect();
                rows.push(vec![button("⬅ Back", B::BackMenu)]);
                View {
                    text: format!(
                        "📝 Your tasks\nTotal: {}\n\n{flash}{fetch_note}",
                        tasks.len()
                    )
                    .trim_end()
                    .to_string(),
                    keyboard: InlineKeyboard {
                        inline_keyboard: rows,
                    },
                }
            }

            S::TaskView => {
                let task = match session.scratch.task_id {
                    Some(task_id) => self
                        .backend
                        .get_task(&chat, task_id)
                        .await
                        .unwrap_or_else(|e| {
                            tracing::warn!(
                                "task_view_failed | telegram_id={chat} task_id={task_id} error={e}"
                            );
                            None
                        }),
                    None => None,
                };
                match task {
                    Some(task) => View {
                        text: format!("{flash}{}", format_task_card(&task)),
                        keyboard: InlineKeyboard {
                            inline_keyboard: vec![
                                vec![button("✏ Edit", B::EditMenu)],
                                vec![button("🗑 Delete", B::AskDelete)],
                                vec![button("⬅ Back", B::BackList)],
                            ],
                        },
                    },
                    None => View {
                        text: format!("{flash}Task not found").trim_end().to_string(),
                        keyboard: InlineKeyboard {
                            inline_keyboard: vec![vec![button("⬅ Back", B::BackList)]],
                        },
                    },
                }
            }

            S::TaskEditMenu => View {
                text: "✏ Choose what to edit:".to_string(),
                keyboard: InlineKeyboard {
                    inline_keyboard: vec![
                        vec![button("📝 Edit title", B::EditTitle)],
                        vec![button("📁 Edit category", B::EditCategory)],
                        vec![button("📅 Edit date", B::EditDate)],
                        vec![button("⏰ Edit time", B::EditTime)],
                        vec![button("⬅ Back", B::BackView)],
                    ],
                },
            },

            S::DeleteConfirm => View {
                text: "🗑 Delete this task?".to_string(),
                keyboard: InlineKeyboard {
                    inline_keyboard: vec![
                        vec![button("✅ Yes", B::ConfirmDelete)],
                        vec![button("⬅ Back", B::CancelDelete)],
                    ],
                },
            },

            S::AddTitle => prompt(flash, "✍ Enter the task title:"),
            S::AddCategory => prompt(flash, "✍ Enter the task category:"),
            S::AddDate => prompt(
                flash,
                "✍ Enter the due date\n📄 Format: DD.MM.YYYY\nExample: 25.12.2024",
            ),
            S::AddTime => prompt(
                flash,
                "✍ Enter the due time\n📄 Format: HH:MM\nExample: 14:30",
            ),
            S::EditTitle => prompt(flash, "✍ Enter the new title:"),
            S::EditCategory => prompt(flash, "✍ Enter the new category:"),
            S::EditDate => prompt(
                flash,
                "✍ Enter the new due date\n📄 Format: DD.MM.YYYY\nExample: 25.12.2024",
            ),
            S::EditTime => prompt(
                flash,
                "✍ Enter the new due time\n📄 Format: HH:MM\nExample: 14:30",
            ),
        }
    }
}

/// Which half of the due timestamp an edit flow replaces.
#[derive(Debug, Clone, Copy)]
enum DueEdit {
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
}

fn prompt(flash: String, text: &str) -> View {
    View {
        text: format!("{flash}{text}"),
        keyboard: InlineKeyboard::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, TaskDto};
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockBackend {
        tasks: Mutex<Vec<TaskDto>>,
        created: Mutex<Vec<(String, String, String, NaiveDateTime)>>,
        updated: Mutex<Vec<(i64, Option<String>, Option<String>, Option<NaiveDateTime>)>>,
        deleted: Mutex<Vec<i64>>,
        fail: bool,
    }

    impl MockBackend {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn with_task(task: TaskDto) -> Self {
            Self {
                tasks: Mutex::new(vec![task]),
                ..Default::default()
            }
        }

        fn unavailable() -> BackendError {
            BackendError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn list_tasks(&self, _chat_id: &str) -> BackendResult<Vec<TaskDto>> {
            if self.fail {
                return Err(Self::unavailable());
            }
            Ok(self.tasks.lock().unwrap().clone())
        }

        async fn create_task(
            &self,
            chat_id: &str,
            title: &str,
            category_name: &str,
            due_date: NaiveDateTime,
        ) -> BackendResult<()> {
            if self.fail {
                return Err(Self::unavailable());
            }
            self.created.lock().unwrap().push((
                chat_id.to_string(),
                title.to_string(),
                category_name.to_string(),
                due_date,
            ));
            Ok(())
        }

        async fn update_task(
            &self,
            _chat_id: &str,
            task_id: i64,
            fields: TaskFields,
        ) -> BackendResult<()> {
            if self.fail {
                return Err(Self::unavailable());
            }
            if !self.tasks.lock().unwrap().iter().any(|t| t.id == task_id) {
                return Err(BackendError::NotFound);
            }
            self.updated.lock().unwrap().push((
                task_id,
                fields.title,
                fields.category_name,
                fields.due_date,
            ));
            Ok(())
        }

        async fn delete_task(&self, _chat_id: &str, task_id: i64) -> BackendResult<()> {
            if self.fail {
                return Err(Self::unavailable());
            }
            self.deleted.lock().unwrap().push(task_id);
            Ok(())
        }
    }

    fn task_due(id: i64, due: &str) -> TaskDto {
        TaskDto {
            id,
            title: "Report".to_string(),
            category_name: Some("Work".to_string()),
            created_at: None,
            due_date: Some(NaiveDateTime::parse_from_str(due, "%Y-%m-%dT%H:%M:%S").unwrap()),
            is_notified: false,
        }
    }

    fn engine(backend: MockBackend) -> (DialogEngine, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        (DialogEngine::new(backend.clone()), backend)
    }

    const CHAT: i64 = 1001;

    async fn drive(engine: &DialogEngine, events: &[Event]) -> View {
        let mut view = engine.handle(CHAT, Event::Restart).await;
        for event in events {
            view = engine.handle(CHAT, event.clone()).await;
        }
        view
    }

    #[tokio::test]
    async fn creation_flow_submits_exactly_one_call() {
        let (engine, backend) = engine(MockBackend::default());
        let view = drive(
            &engine,
            &[
                Event::Button(ButtonId::AddTask),
                Event::Text("Buy milk".into()),
                Event::Text("Shopping".into()),
                Event::Text("25.12.2024".into()),
                Event::Text("14:30".into()),
            ],
        )
        .await;

        let created = backend.created.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        let (chat, title, category, due) = &created[0];
        assert_eq!(chat, "1001");
        assert_eq!(title, "Buy milk");
        assert_eq!(category, "Shopping");
        assert_eq!(due.to_string(), "2024-12-25 14:30:00");

        // Back at the menu with a success flash.
        assert_eq!(engine.session(CHAT).await.state, DialogState::Menu);
        assert!(view.text.contains("✅ Task created"));
    }

    #[tokio::test]
    async fn malformed_date_reprompts_without_touching_scratch() {
        let (engine, backend) = engine(MockBackend::default());
        let view = drive(
            &engine,
            &[
                Event::Button(ButtonId::AddTask),
                Event::Text("Buy milk".into()),
                Event::Text("Shopping".into()),
                Event::Text("31-13-2024".into()),
            ],
        )
        .await;

        let session = engine.session(CHAT).await;
        assert_eq!(session.state, DialogState::AddDate);
        assert_eq!(session.scratch.add_title.as_deref(), Some("Buy milk"));
        assert_eq!(session.scratch.add_category.as_deref(), Some("Shopping"));
        assert!(session.scratch.add_date.is_none());
        assert!(view.text.contains("❌ Invalid date format"));
        assert!(backend.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_time_reprompts_without_submitting() {
        let (engine, backend) = engine(MockBackend::default());
        let view = drive(
            &engine,
            &[
                Event::Button(ButtonId::AddTask),
                Event::Text("Buy milk".into()),
                Event::Text("Shopping".into()),
                Event::Text("25.12.2024".into()),
                Event::Text("25:99".into()),
            ],
        )
        .await;

        assert_eq!(engine.session(CHAT).await.state, DialogState::AddTime);
        assert!(view.text.contains("❌ Invalid time format"));
        assert!(backend.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_submission_flashes_and_returns_to_menu() {
        let (engine, backend) = engine(MockBackend::failing());
        let view = drive(
            &engine,
            &[
                Event::Button(ButtonId::AddTask),
                Event::Text("Buy milk".into()),
                Event::Text("Shopping".into()),
                Event::Text("25.12.2024".into()),
                Event::Text("14:30".into()),
            ],
        )
        .await;

        assert_eq!(engine.session(CHAT).await.state, DialogState::Menu);
        assert!(view.text.contains("❌ Could not create the task"));
        assert!(backend.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_date_preserves_time_of_day() {
        let (engine, backend) = engine(MockBackend::with_task(task_due(7, "2024-01-01T09:00:00")));
        drive(
            &engine,
            &[
                Event::Button(ButtonId::TasksList),
                Event::Button(ButtonId::TaskSelect(7)),
                Event::Button(ButtonId::EditMenu),
                Event::Button(ButtonId::EditDate),
                Event::Text("01.02.2024".into()),
            ],
        )
        .await;

        let updated = backend.updated.lock().unwrap().clone();
        assert_eq!(updated.len(), 1);
        let (task_id, title, category, due) = &updated[0];
        assert_eq!(*task_id, 7);
        assert!(title.is_none() && category.is_none());
        assert_eq!(due.unwrap().to_string(), "2024-02-01 09:00:00");
        assert_eq!(engine.session(CHAT).await.state, DialogState::TaskView);
    }

    #[tokio::test]
    async fn edit_time_preserves_date() {
        let (engine, backend) = engine(MockBackend::with_task(task_due(7, "2024-01-01T09:00:00")));
        drive(
            &engine,
            &[
                Event::Button(ButtonId::TasksList),
                Event::Button(ButtonId::TaskSelect(7)),
                Event::Button(ButtonId::EditMenu),
                Event::Button(ButtonId::EditTime),
                Event::Text("18:45".into()),
            ],
        )
        .await;

        let updated = backend.updated.lock().unwrap().clone();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].3.unwrap().to_string(), "2024-01-01 18:45:00");
    }

    #[tokio::test]
    async fn editing_vanished_task_redirects_to_list() {
        let (engine, backend) = engine(MockBackend::with_task(task_due(7, "2024-01-01T09:00:00")));
        drive(
            &engine,
            &[
                Event::Button(ButtonId::TasksList),
                Event::Button(ButtonId::TaskSelect(7)),
                Event::Button(ButtonId::EditMenu),
                Event::Button(ButtonId::EditTitle),
            ],
        )
        .await;
        // Task vanishes between fetch and act.
        backend.tasks.lock().unwrap().clear();

        let view = engine.handle(CHAT, Event::Text("New title".into())).await;
        assert_eq!(engine.session(CHAT).await.state, DialogState::TasksList);
        assert!(view.text.contains("❌ Task not found"));
        assert!(backend.updated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn flash_is_consumed_exactly_once() {
        let (engine, backend) = engine(MockBackend::with_task(task_due(7, "2024-01-01T09:00:00")));
        let view = drive(
            &engine,
            &[
                Event::Button(ButtonId::TasksList),
                Event::Button(ButtonId::TaskSelect(7)),
                Event::Button(ButtonId::AskDelete),
                Event::Button(ButtonId::ConfirmDelete),
            ],
        )
        .await;
        assert_eq!(backend.deleted.lock().unwrap().as_slice(), &[7]);
        assert!(view.text.contains("✅ Task deleted"));

        // Next render must not repeat the flash.
        let view = engine.handle(CHAT, Event::Button(ButtonId::BackMenu)).await;
        assert!(!view.text.contains("✅ Task deleted"));
    }

    #[tokio::test]
    async fn list_degrades_when_backend_is_down() {
        let (engine, _) = engine(MockBackend::failing());
        let view = drive(&engine, &[Event::Button(ButtonId::TasksList)]).await;
        assert!(view.text.contains("Total: 0"));
        assert!(view.text.contains("❌ Could not fetch tasks"));
        // The session survives and can navigate back.
        let view = engine.handle(CHAT, Event::Button(ButtonId::BackMenu)).await;
        assert!(view.text.contains("📋 Task manager"));
    }

    #[tokio::test]
    async fn restart_discards_in_flight_scratch() {
        let (engine, _) = engine(MockBackend::default());
        drive(
            &engine,
            &[
                Event::Button(ButtonId::AddTask),
                Event::Text("Half-typed".into()),
            ],
        )
        .await;
        engine.handle(CHAT, Event::Restart).await;

        let session = engine.session(CHAT).await;
        assert_eq!(session.state, DialogState::Menu);
        assert_eq!(session.scratch, Scratch::default());
    }

    #[tokio::test]
    async fn stale_button_press_is_ignored() {
        let (engine, _) = engine(MockBackend::default());
        let view = drive(&engine, &[Event::Button(ButtonId::ConfirmDelete)]).await;
        // Still at the menu; no delete was attempted from there.
        assert_eq!(engine.session(CHAT).await.state, DialogState::Menu);
        assert!(view.text.contains("📋 Task manager"));
    }

    #[test]
    fn button_callback_data_round_trips() {
        let buttons = [
            ButtonId::TasksList,
            ButtonId::AddTask,
            ButtonId::TaskSelect(42),
            ButtonId::BackMenu,
            ButtonId::BackList,
            ButtonId::BackView,
            ButtonId::EditMenu,
            ButtonId::AskDelete,
            ButtonId::ConfirmDelete,
            ButtonId::CancelDelete,
            ButtonId::EditTitle,
            ButtonId::EditCategory,
            ButtonId::EditDate,
            ButtonId::EditTime,
        ];
        for id in buttons {
            assert_eq!(ButtonId::parse(&id.callback_data()), Some(id));
        }
        assert_eq!(ButtonId::parse("task:notanumber"), None);
        assert_eq!(ButtonId::parse("bogus"), None);
    }
}
