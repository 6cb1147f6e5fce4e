use rust_decimal::Decimal;

use crate::models::{MenuItem, OrderItem};

/// Items picked for an order that has not been placed yet.
///
/// The same dish may appear several times; entries are told apart by index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cart {
    items: Vec<MenuItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item`. Sold-out items are ignored and `false` is returned.
    pub fn add(&mut self, item: &MenuItem) -> bool {
        if item.terminated {
            return false;
        }
        self.items.push(item.clone());
        true
    }

    pub fn remove_at(&mut self, index: usize) -> Option<MenuItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(|item| item.price).sum()
    }

    pub fn snapshot(&self) -> Vec<OrderItem> {
        self.items.iter().map(OrderItem::from).collect()
    }
}
