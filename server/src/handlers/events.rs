use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub date: Option<DateTime<Utc>>,
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.events.list_events().await?;
    Ok(success(events.as_ref(), "Events retrieved"))
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    let event = state
        .events
        .create_event(&request.title, request.date)
        .await?;
    Ok(created(event, "Event created"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    let event = state.events.get_event(event_id).await?;
    Ok(success(event, "Event retrieved"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    state.events.delete_event(event_id).await?;
    Ok(empty_success("Event deleted"))
}
