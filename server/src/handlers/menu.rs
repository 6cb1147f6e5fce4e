use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use super::{DeleteSelectionRequest, ReorderRequest};
use crate::state::AppState;
use crate::utils::response::{created, success};
use crate::utils::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateMenuItemRequest {
    pub title: String,
    pub price: Option<Decimal>,
    pub category_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMenuItemRequest {
    pub title: String,
    pub price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ToggleStatusRequest {
    pub terminated: bool,
}

pub async fn list_menu(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    state.events.get_event(event_id).await?;
    let items = state.queries.use_menu(event_id).data().await?;
    Ok(success(items.as_ref(), "Menu retrieved"))
}

pub async fn grouped_menu(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    state.events.get_event(event_id).await?;
    let sections = state.menu.grouped_menu(event_id).await?;
    Ok(success(sections, "Menu retrieved"))
}

pub async fn add_menu_item(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<CreateMenuItemRequest>,
) -> Result<Response, AppError> {
    let item = state
        .menu
        .add_menu_item(event_id, &request.title, request.price, request.category_id)
        .await?;
    Ok(created(item, "Menu item added"))
}

pub async fn update_menu_item(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(request): Json<UpdateMenuItemRequest>,
) -> Result<Response, AppError> {
    let item = state
        .menu
        .update_menu_item(item_id, &request.title, request.price)
        .await?;
    Ok(success(item, "Menu item updated"))
}

pub async fn toggle_status(
    State(state): State<AppState>,
    Path(item_id): Path<i64>,
    Json(request): Json<ToggleStatusRequest>,
) -> Result<Response, AppError> {
    let item = state
        .menu
        .toggle_status(item_id, request.terminated)
        .await?;
    Ok(success(item, "Menu item status updated"))
}

pub async fn delete_menu_items(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<DeleteSelectionRequest>,
) -> Result<Response, AppError> {
    let deleted = state
        .menu
        .delete_items(event_id, &request.ids, request.confirm)
        .await?;
    Ok(success(json!({ "deleted": deleted }), "Menu items deleted"))
}

pub async fn reorder_menu(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<ReorderRequest>,
) -> Result<Response, AppError> {
    let items = state
        .menu
        .reorder_items(event_id, request.drag_index, request.hover_index)
        .await?;
    Ok(success(items, "Menu reordered"))
}
