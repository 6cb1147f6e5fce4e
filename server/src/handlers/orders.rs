use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tracing::debug;

use crate::orders::{OrderDraft, OrderEdit};
use crate::state::AppState;
use crate::utils::response::{created, empty_success, success};
use crate::utils::AppError;

/// Customer plus the picked menu item ids; an id may repeat.
#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub customer_name: String,
    #[serde(default)]
    pub item_ids: Vec<i64>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Response, AppError> {
    state.events.get_event(event_id).await?;
    let orders = state.queries.use_orders(event_id).data().await?;
    Ok(success(orders.as_ref(), "Orders retrieved"))
}

pub async fn create_order(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
    Json(request): Json<OrderRequest>,
) -> Result<Response, AppError> {
    state.events.get_event(event_id).await?;
    let menu = state.queries.use_menu(event_id).data().await?;

    let mut draft = OrderDraft::new();
    draft.set_customer_name(request.customer_name)?;
    for item_id in request.item_ids {
        let item = menu
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| AppError::validation(format!("Menu item {} does not exist", item_id)))?;
        if !draft.add_to_cart(item)? {
            debug!(item_id, "Skipping sold out item");
        }
    }

    let order = state.orders.submit(&mut draft, event_id).await?;
    Ok(created(order, "Order created"))
}

pub async fn update_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(request): Json<OrderRequest>,
) -> Result<Response, AppError> {
    let order = state.orders.get_order(order_id).await?;
    let menu = state.queries.use_menu(order.event_id).data().await?;

    let mut edit = OrderEdit::from_order(&order);
    edit.set_customer_name(request.customer_name);
    edit.select_items(&request.item_ids, &menu)?;

    let order = state.orders.save_edit(&edit).await?;
    Ok(success(order, "Order updated"))
}

pub async fn delete_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
) -> Result<Response, AppError> {
    state.orders.delete_order(order_id).await?;
    Ok(empty_success("Order deleted"))
}
