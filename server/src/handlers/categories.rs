use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::{DeleteSelectionRequest, ReorderRequest};
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

pub async fn list_categories(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    state.events.get_event(event_id).await?;
    let categories = state.queries.use_categories(event_id).data().await?;
    Ok(success(categories.as_ref(), "Categories retrieved"))
}

pub async fn add_category(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<Response, AppError> {
    let category = state.menu.add_category(event_id, &request.name).await?;
    Ok(created(category, "Category added"))
}

pub async fn delete_categories(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<DeleteSelectionRequest>,
) -> Result<Response, AppError> {
    let deleted = state
        .menu
        .delete_categories(event_id, &request.ids, request.confirm)
        .await?;
    Ok(success(json!({ "deleted": deleted }), "Categories deleted"))
}

pub async fn reorder_categories(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<ReorderRequest>,
) -> Result<Response, AppError> {
    let categories = state
        .menu
        .reorder_categories(event_id, request.drag_index, request.hover_index)
        .await?;
    Ok(success(categories, "Categories reordered"))
}
