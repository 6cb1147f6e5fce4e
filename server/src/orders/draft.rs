use serde::Serialize;

use super::cart::Cart;
use crate::models::{MenuItem, Order};
use crate::utils::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Empty,
    Editing,
    Submitting,
}

/// What gets sent to the backend for one submission attempt.
#[derive(Debug, Clone)]
pub struct Submission {
    pub customer_name: String,
    pub items: Vec<MenuItem>,
}

/// An order being put together.
///
/// ```text
/// Empty -> Editing -> Submitting -> Empty      (success)
///                                -> Editing    (failure, input kept)
/// ```
#[derive(Debug, Clone, Default)]
pub struct OrderDraft {
    customer_name: String,
    cart: Cart,
    submitting: bool,
    error: Option<String>,
}

pub(crate) fn validate_order(customer_name: &str, item_count: usize) -> Result<String, AppError> {
    let customer_name = customer_name.trim();
    if customer_name.is_empty() {
        return Err(AppError::validation("Customer name is required"));
    }
    if item_count == 0 {
        return Err(AppError::validation("Select at least one menu item"));
    }
    Ok(customer_name.to_string())
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> DraftStatus {
        if self.submitting {
            DraftStatus::Submitting
        } else if !self.customer_name.is_empty() || !self.cart.is_empty() {
            DraftStatus::Editing
        } else {
            DraftStatus::Empty
        }
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn cart(&self) -> &Cart {
        &self.cart
    }

    /// Message of the last failed submission.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn ensure_editable(&self) -> Result<(), AppError> {
        if self.submitting {
            Err(AppError::Conflict(
                "The order is being submitted".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn set_customer_name(&mut self, name: impl Into<String>) -> Result<(), AppError> {
        self.ensure_editable()?;
        self.customer_name = name.into();
        Ok(())
    }

    /// Returns whether the item was added; sold-out items are skipped.
    pub fn add_to_cart(&mut self, item: &MenuItem) -> Result<bool, AppError> {
        self.ensure_editable()?;
        Ok(self.cart.add(item))
    }

    pub fn remove_from_cart(&mut self, index: usize) -> Result<Option<MenuItem>, AppError> {
        self.ensure_editable()?;
        Ok(self.cart.remove_at(index))
    }

    /// Validates the draft and moves it to `Submitting`.
    ///
    /// Fails without touching the draft's input when validation fails or a
    /// submission is already running.
    pub fn begin_submit(&mut self) -> Result<Submission, AppError> {
        self.ensure_editable()?;
        match validate_order(&self.customer_name, self.cart.len()) {
            Ok(customer_name) => {
                self.submitting = true;
                self.error = None;
                Ok(Submission {
                    customer_name,
                    items: self.cart.items().to_vec(),
                })
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Ends a submission started with [`Self::begin_submit`].
    pub fn finish(&mut self, outcome: &Result<Order, AppError>) {
        self.submitting = false;
        match outcome {
            Ok(_) => {
                self.customer_name.clear();
                self.cart.clear();
                self.error = None;
            }
            Err(e) => {
                self.error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn dish(id: i64) -> MenuItem {
        MenuItem {
            id,
            event_id: 1,
            category_id: None,
            title: format!("dish {}", id),
            price: Decimal::new(5, 0),
            terminated: false,
            position: None,
        }
    }

    fn placed() -> Order {
        Order {
            id: 1,
            event_id: 1,
            customer_name: "Mario".to_string(),
            items: Vec::new(),
            total: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_follows_input() {
        let mut draft = OrderDraft::new();
        assert_eq!(draft.status(), DraftStatus::Empty);

        draft.add_to_cart(&dish(1)).unwrap();
        assert_eq!(draft.status(), DraftStatus::Editing);

        draft.remove_from_cart(0).unwrap();
        assert_eq!(draft.status(), DraftStatus::Empty);

        draft.set_customer_name("Mario").unwrap();
        assert_eq!(draft.status(), DraftStatus::Editing);
    }

    #[test]
    fn test_validation_keeps_draft_editable() {
        let mut draft = OrderDraft::new();
        draft.set_customer_name("   ").unwrap();
        draft.add_to_cart(&dish(1)).unwrap();

        let err = draft.begin_submit().unwrap_err();
        assert!(err.is_validation());
        assert_eq!(draft.status(), DraftStatus::Editing);
        assert!(draft.error().unwrap().contains("Customer name"));

        draft.set_customer_name("Mario").unwrap();
        draft.remove_from_cart(0).unwrap();
        assert!(draft.begin_submit().unwrap_err().is_validation());
    }

    #[test]
    fn test_success_resets_to_empty() {
        let mut draft = OrderDraft::new();
        draft.set_customer_name(" Mario ").unwrap();
        draft.add_to_cart(&dish(1)).unwrap();

        let submission = draft.begin_submit().unwrap();
        assert_eq!(submission.customer_name, "Mario");
        assert_eq!(draft.status(), DraftStatus::Submitting);

        draft.finish(&Ok(placed()));
        assert_eq!(draft.status(), DraftStatus::Empty);
        assert!(draft.error().is_none());
    }

    #[test]
    fn test_failure_returns_to_editing_with_input() {
        let mut draft = OrderDraft::new();
        draft.set_customer_name("Mario").unwrap();
        draft.add_to_cart(&dish(1)).unwrap();
        draft.add_to_cart(&dish(1)).unwrap();

        draft.begin_submit().unwrap();
        draft.finish(&Err(AppError::from(StoreError::Unavailable)));

        assert_eq!(draft.status(), DraftStatus::Editing);
        assert_eq!(draft.customer_name(), "Mario");
        assert_eq!(draft.cart().len(), 2);
        assert!(draft.error().is_some());
    }

    #[test]
    fn test_second_submit_is_rejected_while_submitting() {
        let mut draft = OrderDraft::new();
        draft.set_customer_name("Mario").unwrap();
        draft.add_to_cart(&dish(1)).unwrap();
        draft.begin_submit().unwrap();

        assert!(matches!(draft.begin_submit(), Err(AppError::Conflict(_))));
        assert!(draft.add_to_cart(&dish(2)).is_err());
        assert_eq!(draft.cart().len(), 1);
    }
}
