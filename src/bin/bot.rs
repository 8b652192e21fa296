//! taskgram Telegram bot: long-polls updates and drives the dialog engine.

use std::sync::Arc;
use std::time::Duration;

use taskgram::backend::HttpBackend;
use taskgram::dialog::{ButtonId, DialogEngine, Event, View};
use taskgram::notify::NOTIFICATION_ACK;
use taskgram::telegram::{TelegramClient, Update};
use taskgram::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskgram=info".into()),
        )
        .init();

    let config = Config::from_env();
    let telegram = TelegramClient::from_env();
    if !telegram.is_configured() {
        anyhow::bail!("TELEGRAM_BOT_TOKEN must be set to run the bot");
    }

    let backend = Arc::new(HttpBackend::new(&config.backend_url));
    let engine = DialogEngine::new(backend);

    tracing::info!("Bot starting (backend: {})", config.backend_url);

    let mut offset = 0i64;
    loop {
        let updates = match telegram.get_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                tracing::warn!("getUpdates failed, backing off: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            handle_update(&telegram, &engine, update).await;
        }
    }
}

/// Route one Telegram update into the dialog engine and send the rendered
/// window back. Per-chat updates arrive sequentially from the poll loop,
/// so one step is in flight per session at a time.
async fn handle_update(telegram: &TelegramClient, engine: &DialogEngine, update: Update) {
    if let Some(message) = update.message {
        let chat_id = message.chat.id;
        let Some(text) = message.text else { return };
        let event = if text.trim() == "/start" {
            tracing::info!("start | telegram_id={chat_id}");
            Event::Restart
        } else {
            Event::Text(text)
        };
        let view = engine.handle(chat_id, event).await;
        send_view(telegram, chat_id, &view).await;
    } else if let Some(callback) = update.callback_query {
        telegram.answer_callback_query(&callback.id).await;

        let data = callback.data.as_deref().unwrap_or_default();
        if data == NOTIFICATION_ACK {
            // Acknowledged reminder: dismiss the message.
            if let Some(message) = callback.message {
                telegram.delete_message(message.chat.id, message.message_id).await;
            }
            return;
        }

        let Some(button) = ButtonId::parse(data) else {
            tracing::debug!("unknown callback data: {data}");
            return;
        };
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(callback.from.id);
        let view = engine.handle(chat_id, Event::Button(button)).await;
        send_view(telegram, chat_id, &view).await;
    }
}

async fn send_view(telegram: &TelegramClient, chat_id: i64, view: &View) {
    let keyboard = (!view.keyboard.is_empty()).then_some(&view.keyboard);
    if !telegram
        .send_message(&chat_id.to_string(), &view.text, keyboard)
        .await
    {
        tracing::warn!("failed to render dialog window for chat {chat_id}");
    }
}
