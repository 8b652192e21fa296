//! Telegram Bot API client.
//!
//! Thin reqwest wrapper over the handful of methods the service needs:
//! `sendMessage` (with optional inline keyboard), `getUpdates` long polling,
//! `answerCallbackQuery` and `deleteMessage`. The bot token comes from the
//! environment; without it the client degrades to a logged no-op so the
//! serving process never crashes over a missing credential.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Environment variable holding the bot token.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Outbound send timeout. Reminders and view renders are small payloads.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Long-poll window for `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;

/// One button of an inline keyboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

/// Inline keyboard rows attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboard {
    pub fn is_empty(&self) -> bool {
        self.inline_keyboard.is_empty()
    }

    /// Single-button keyboard, used for reminder acknowledgement.
    pub fn single(text: &str, callback_data: &str) -> Self {
        Self {
            inline_keyboard: vec![vec![InlineKeyboardButton {
                text: text.to_string(),
                callback_data: callback_data.to_string(),
            }]],
        }
    }
}

/// An incoming update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: CallbackSender,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackSender {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram Bot API client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: Option<String>,
}

impl TelegramClient {
    /// Build a client from an explicit token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: Some(token.into()),
        }
    }

    /// Build a client from `TELEGRAM_BOT_TOKEN`. A missing token yields a
    /// client whose sends warn and report failure instead of panicking.
    pub fn from_env() -> Self {
        let token = std::env::var(BOT_TOKEN_ENV).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!("{BOT_TOKEN_ENV} is not set, Telegram sends will be skipped");
        }
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Whether a token is configured.
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn method_url(&self, token: &str, method: &str) -> String {
        format!("{TELEGRAM_API_URL}/bot{token}/{method}")
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> anyhow::Result<T> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no bot token configured"))?;
        let response = self
            .client
            .post(self.method_url(token, method))
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("telegram {method} returned {status}: {body}");
        }
        let envelope: ApiEnvelope<T> = serde_json::from_str(&body)?;
        if !envelope.ok {
            anyhow::bail!(
                "telegram {method} rejected: {}",
                envelope.description.unwrap_or_default()
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("telegram {method} returned empty result"))
    }

    /// Send a message, optionally with an inline keyboard.
    ///
    /// Returns `true` on confirmed 2xx delivery. A missing token logs a
    /// warning and reports `false`; callers treat that as "retry later".
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> bool {
        if self.token.is_none() {
            tracing::warn!("{BOT_TOKEN_ENV} is not set, skipping message to chat {chat_id}");
            return false;
        }
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(keyboard) = keyboard.filter(|k| !k.is_empty()) {
            body["reply_markup"] = json!(keyboard);
        }
        match self
            .call::<serde_json::Value>("sendMessage", body, SEND_TIMEOUT)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("failed to send Telegram message to chat {chat_id}: {e}");
                false
            }
        }
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        let body = json!({ "offset": offset, "timeout": POLL_TIMEOUT_SECS });
        // Allow headroom over the server-side poll window.
        self.call(
            "getUpdates",
            body,
            Duration::from_secs(POLL_TIMEOUT_SECS + 10),
        )
        .await
    }

    /// Acknowledge a callback query so the client stops its spinner.
    pub async fn answer_callback_query(&self, callback_query_id: &str) {
        let body = json!({ "callback_query_id": callback_query_id });
        if let Err(e) = self
            .call::<serde_json::Value>("answerCallbackQuery", body, SEND_TIMEOUT)
            .await
        {
            tracing::debug!("answerCallbackQuery failed: {e}");
        }
    }

    /// Delete a message (used to dismiss acknowledged reminders).
    pub async fn delete_message(&self, chat_id: i64, message_id: i64) {
        let body = json!({ "chat_id": chat_id, "message_id": message_id });
        if let Err(e) = self
            .call::<serde_json::Value>("deleteMessage", body, SEND_TIMEOUT)
            .await
        {
            tracing::debug!("deleteMessage failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_button_keyboard_shape() {
        let keyboard = InlineKeyboard::single("✅ OK", "notification_ok");
        let value = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "inline_keyboard": [[{ "text": "✅ OK", "callback_data": "notification_ok" }]]
            })
        );
    }

    #[test]
    fn envelope_parses_without_result_field() {
        // Error replies omit `result`; Update has no Default impl, so the
        // envelope must not require one.
        let envelope: ApiEnvelope<Update> =
            serde_json::from_str(r#"{"ok":false,"description":"Unauthorized"}"#).unwrap();
        assert!(!envelope.ok);
        assert!(envelope.result.is_none());
        assert_eq!(envelope.description.as_deref(), Some("Unauthorized"));

        let envelope: ApiEnvelope<Vec<Update>> = serde_json::from_str(
            r#"{"ok":true,"result":[{"update_id":7,"message":{"message_id":1,"chat":{"id":1001},"text":"/start"}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.result.unwrap()[0].update_id, 7);
    }

    #[tokio::test]
    async fn unconfigured_client_degrades_to_noop() {
        let client = TelegramClient {
            client: reqwest::Client::new(),
            token: None,
        };
        assert!(!client.is_configured());
        assert!(!client.send_message("1001", "hello", None).await);
    }
}
