use tracing::{info, warn};

use super::draft::{validate_order, OrderDraft};
use super::edit::OrderEdit;
use crate::models::{MenuItem, NewOrder, Order, OrderItem, OrderPatch};
use crate::store::{decode_one, encode_row, Filter, SharedClient, StoreError, Table};
use crate::sync::QueryCache;
use crate::utils::AppError;

/// Places, edits and removes orders. Input is validated before anything is
/// sent to the backend.
#[derive(Clone)]
pub struct OrderComposer {
    queries: QueryCache,
}

impl OrderComposer {
    pub fn new(queries: QueryCache) -> Self {
        Self { queries }
    }

    fn client(&self) -> &SharedClient {
        self.queries.client()
    }

    async fn refresh(&self, event_id: i64) {
        if let Err(e) = self.queries.use_orders(event_id).mutate().await {
            warn!(event_id, error = %e, "Could not refresh orders");
        }
    }

    pub async fn get_order(&self, order_id: i64) -> Result<Order, AppError> {
        let rows = self
            .client()
            .select(Table::Orders, &[Filter::eq("id", order_id)])
            .await?;
        decode_one(Table::Orders, rows).map_err(|e| match e {
            StoreError::NotFound { .. } => AppError::NotFound(format!("Order {}", order_id)),
            other => other.into(),
        })
    }

    /// Stores a new order with a snapshot of `cart` and its total.
    pub async fn create_order(
        &self,
        event_id: i64,
        customer_name: &str,
        cart: &[MenuItem],
    ) -> Result<Order, AppError> {
        let customer_name = validate_order(customer_name, cart.len())?;
        let items: Vec<OrderItem> = cart.iter().map(OrderItem::from).collect();
        let row = encode_row(&NewOrder::new(event_id, customer_name, items))?;

        let rows = self.client().insert(Table::Orders, vec![row]).await?;
        let order: Order = decode_one(Table::Orders, rows)?;

        info!(order_id = order.id, event_id, total = %order.total, "Order created");
        self.refresh(event_id).await;
        Ok(order)
    }

    /// Replaces the customer and items of an order; the total is recomputed.
    pub async fn update_order(
        &self,
        order_id: i64,
        customer_name: &str,
        items: &[OrderItem],
    ) -> Result<Order, AppError> {
        let customer_name = validate_order(customer_name, items.len())?;
        let patch = encode_row(&OrderPatch::new(customer_name, items.to_vec()))?;

        let rows = self
            .client()
            .update(Table::Orders, patch, &[Filter::eq("id", order_id)])
            .await?;
        let order: Order = decode_one(Table::Orders, rows).map_err(|e| match e {
            StoreError::NotFound { .. } => AppError::NotFound(format!("Order {}", order_id)),
            other => other.into(),
        })?;

        info!(order_id, total = %order.total, "Order updated");
        self.refresh(order.event_id).await;
        Ok(order)
    }

    pub async fn save_edit(&self, edit: &OrderEdit) -> Result<Order, AppError> {
        self.update_order(edit.order_id(), edit.customer_name(), edit.items())
            .await
    }

    pub async fn delete_order(&self, order_id: i64) -> Result<(), AppError> {
        let order = self.get_order(order_id).await?;
        let removed = self
            .client()
            .delete(Table::Orders, &[Filter::eq("id", order_id)])
            .await?;
        if removed == 0 {
            return Err(AppError::NotFound(format!("Order {}", order_id)));
        }

        info!(order_id, event_id = order.event_id, "Order deleted");
        self.refresh(order.event_id).await;
        Ok(())
    }

    /// Submits `draft` as a new order of `event_id`, driving it through
    /// `Submitting` and back to `Empty` or `Editing`.
    pub async fn submit(&self, draft: &mut OrderDraft, event_id: i64) -> Result<Order, AppError> {
        let submission = draft.begin_submit()?;
        let outcome = self
            .create_order(event_id, &submission.customer_name, &submission.items)
            .await;
        draft.finish(&outcome);
        outcome
    }
}
