use thiserror::Error;

use crate::models::{MenuCategory, MenuItem};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ReorderError {
    #[error("index {index} is out of bounds for {len} entries")]
    OutOfBounds { index: usize, len: usize },
}

/// Anything with a user-controlled display rank.
pub trait Positioned {
    fn position(&self) -> Option<i32>;
    fn set_position(&mut self, position: i32);
}

impl Positioned for MenuItem {
    fn position(&self) -> Option<i32> {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = Some(position);
    }
}

impl Positioned for MenuCategory {
    fn position(&self) -> Option<i32> {
        Some(self.position)
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

/// Stable sort by position; entries without one go last in their original
/// order.
pub fn sort_by_position<T: Positioned>(entries: &mut [T]) {
    entries.sort_by_key(|entry| match entry.position() {
        Some(position) => (0, position),
        None => (1, 0),
    });
}

/// Renumbers `entries` to `1..=len` in their current order.
pub fn assign_positions<T: Positioned>(entries: &mut [T]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.set_position(index as i32 + 1);
    }
}

/// Moves the entry at `drag_index` to `hover_index`, then renumbers every
/// entry.
pub fn reorder<T: Positioned>(
    mut entries: Vec<T>,
    drag_index: usize,
    hover_index: usize,
) -> Result<Vec<T>, ReorderError> {
    let len = entries.len();
    for index in [drag_index, hover_index] {
        if index >= len {
            return Err(ReorderError::OutOfBounds { index, len });
        }
    }

    let dragged = entries.remove(drag_index);
    entries.insert(hover_index, dragged);
    assign_positions(&mut entries);
    Ok(entries)
}
