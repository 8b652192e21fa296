//! REST API surface.

pub mod categories;
pub mod routes;
pub mod tasks;

pub use routes::{serve, AppState};
