//! Per-event menu: items, their categories and display order.

pub mod grouping;
pub mod manager;
pub mod reorder;

pub use grouping::{group_by_category, MenuSection, UNCATEGORIZED};
pub use manager::MenuManager;
pub use reorder::{reorder, Positioned, ReorderError};
