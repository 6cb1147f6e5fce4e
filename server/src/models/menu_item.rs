use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: i64,
    pub event_id: i64,
    /// `None` (or a deleted category) renders as uncategorized.
    pub category_id: Option<i64>,
    pub title: String,
    pub price: Decimal,
    /// Sold out. Kept for the history of past orders but not orderable.
    pub terminated: bool,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMenuItem {
    pub event_id: i64,
    pub category_id: i64,
    pub title: String,
    pub price: Decimal,
    pub terminated: bool,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MenuItemPatch {
    pub title: String,
    pub price: Decimal,
}
