//! Runtime configuration, read from environment variables.

/// Service configuration shared by the API and bot binaries.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interface the API server binds to.
    pub host: String,
    /// Port the API server binds to.
    pub port: u16,
    /// Path of the SQLite database file.
    pub database_path: String,
    /// Base URL the bot uses to reach the API.
    pub backend_url: String,
    /// Seconds between notification sweeps.
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Build a config from the environment, falling back to defaults:
    /// - `HOST` (default `0.0.0.0`)
    /// - `PORT` (default `8000`)
    /// - `DATABASE_PATH` (default `taskgram.db`)
    /// - `BACKEND_URL` (default `http://localhost:8000`)
    /// - `SWEEP_INTERVAL_SECS` (default `60`)
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parsed("PORT", 8000),
            database_path: env_or("DATABASE_PATH", "taskgram.db"),
            backend_url: env_or("BACKEND_URL", "http://localhost:8000"),
            sweep_interval_secs: env_parsed("SWEEP_INTERVAL_SECS", 60),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
