use axum::response::Response;
use serde::{Deserialize, Serialize};

use crate::utils::response::success;

pub mod categories;
pub mod changes;
pub mod events;
pub mod menu;
pub mod orders;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "catering-api",
    };

    success(payload, "Health check successful")
}

/// Body of bulk deletes. Nothing is removed unless `confirm` is set.
#[derive(Debug, Deserialize)]
pub struct DeleteSelectionRequest {
    pub ids: Vec<i64>,
    #[serde(default)]
    pub confirm: bool,
}

/// Body of drag and drop moves, indices into the list in display order.
#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub drag_index: usize,
    pub hover_index: usize,
}
