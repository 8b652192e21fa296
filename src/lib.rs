//! # taskgram
//!
//! A personal task tracker with two front ends: a REST API over a SQLite
//! store, and a Telegram dialog bot that drives that API over HTTP. A
//! background sweep notifies users about tasks whose deadline has passed.
//!
//! ```text
//!   user ──▶ dialog engine ──▶ backend client ──▶ REST API ──▶ task store
//!                                                     ▲            │
//!                                  notification sweep ┴────────────┘
//!                                   (reads due tasks, sends reminders)
//! ```
//!
//! ## Modules
//! - `idgen`: sortable 63-bit primary keys without database sequences
//! - `store`: users, categories and tasks on rusqlite
//! - `api`: axum route handlers for the REST surface
//! - `notify`: the periodic due-task notification sweep
//! - `dialog`: the per-chat finite-state dialog engine
//! - `backend`: HTTP client the bot uses to reach the API
//! - `telegram`: thin Telegram Bot API client

pub mod api;
pub mod backend;
pub mod config;
pub mod dialog;
pub mod idgen;
pub mod notify;
pub mod store;
pub mod telegram;

pub use config::Config;
pub use idgen::IdGenerator;
