use rust_decimal::Decimal;

use crate::models::order::total_of;
use crate::models::{MenuItem, Order, OrderItem};
use crate::utils::AppError;

/// Pending changes to a placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderEdit {
    order_id: i64,
    customer_name: String,
    original: Vec<OrderItem>,
    items: Vec<OrderItem>,
}

impl OrderEdit {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            original: order.items.clone(),
            items: order.items.clone(),
        }
    }

    pub fn order_id(&self) -> i64 {
        self.order_id
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn set_customer_name(&mut self, name: impl Into<String>) {
        self.customer_name = name.into();
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total(&self) -> Decimal {
        total_of(&self.items)
    }

    /// Adds the dish when absent, removes every copy when present. Sold-out
    /// dishes cannot be toggled. Returns whether anything changed.
    pub fn toggle_item(&mut self, item: &MenuItem) -> bool {
        if item.terminated {
            return false;
        }
        if self.items.iter().any(|i| i.id == item.id) {
            self.items.retain(|i| i.id != item.id);
        } else {
            self.items.push(OrderItem::from(item));
        }
        true
    }

    /// Replaces the selection with `ids` (repeats allowed).
    ///
    /// Dishes already on the order keep the snapshot taken when they were
    /// ordered; new ones are copied from `menu` and must be available.
    pub fn select_items(&mut self, ids: &[i64], menu: &[MenuItem]) -> Result<(), AppError> {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(existing) = self.original.iter().find(|i| i.id == *id) {
                selected.push(existing.clone());
                continue;
            }
            let item = menu
                .iter()
                .find(|i| i.id == *id)
                .ok_or_else(|| AppError::validation(format!("Menu item {} does not exist", id)))?;
            if item.terminated {
                return Err(AppError::validation(format!("{} is sold out", item.title)));
            }
            selected.push(OrderItem::from(item));
        }
        self.items = selected;
        Ok(())
    }
}
