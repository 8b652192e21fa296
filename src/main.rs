//! taskgram API server: REST endpoints plus the notification sweep.

use std::sync::Arc;
use std::time::Duration;

use taskgram::idgen::IdGenerator;
use taskgram::notify::{self, Messenger};
use taskgram::store::TaskStore;
use taskgram::telegram::TelegramClient;
use taskgram::{api, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskgram=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Starting taskgram API (db: {})", config.database_path);

    let ids = Arc::new(IdGenerator::new());
    let store = Arc::new(TaskStore::open(&config.database_path, ids)?);

    // Reminders go straight through the Telegram client; a missing token
    // degrades sends to logged no-ops.
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramClient::from_env());
    tokio::spawn(notify::sweep_loop(
        Arc::clone(&store),
        messenger,
        Duration::from_secs(config.sweep_interval_secs),
    ));

    api::serve(config, store).await
}
