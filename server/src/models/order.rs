use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::MenuItem;

/// Copy of a menu item taken when it was ordered. Later menu edits never
/// reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub title: String,
    pub price: Decimal,
}

impl From<&MenuItem> for OrderItem {
    fn from(item: &MenuItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            price: item.price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub event_id: i64,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

pub fn total_of(items: &[OrderItem]) -> Decimal {
    items.iter().map(|item| item.price).sum()
}

#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub event_id: i64,
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
}

impl NewOrder {
    pub fn new(event_id: i64, customer_name: impl Into<String>, items: Vec<OrderItem>) -> Self {
        let total = total_of(&items);
        Self {
            event_id,
            customer_name: customer_name.into(),
            items,
            total,
        }
    }
}

/// Wholesale replacement of an order's customer and items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPatch {
    pub customer_name: String,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
}

impl OrderPatch {
    pub fn new(customer_name: impl Into<String>, items: Vec<OrderItem>) -> Self {
        let total = total_of(&items);
        Self {
            customer_name: customer_name.into(),
            items,
            total,
        }
    }
}
