//! Category endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::store::Category;

use super::routes::{store_error, AppState};

/// Create category routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_categories).post(create_category))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

/// GET /api/categories - List all categories.
async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, (StatusCode, String)> {
    let categories = state.store.list_categories().map_err(store_error)?;
    Ok(Json(categories))
}

/// POST /api/categories - Create a category.
async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), (StatusCode, String)> {
    let category = state.store.create_category(&req.name).map_err(store_error)?;
    tracing::info!("Created category '{}' ({})", category.name, category.id);
    Ok((StatusCode::CREATED, Json(category)))
}
