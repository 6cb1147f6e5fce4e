//! Taking orders: a cart of menu items, the draft it lives in while the
//! customer is being served, and persistence of the result.

pub mod cart;
pub mod composer;
pub mod draft;
pub mod edit;

pub use cart::Cart;
pub use composer::OrderComposer;
pub use draft::{DraftStatus, OrderDraft, Submission};
pub use edit::OrderEdit;
