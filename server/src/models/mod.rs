pub mod category;
pub mod event;
pub mod menu_item;
pub mod order;

pub use category::{MenuCategory, NewMenuCategory};
pub use event::{Event, NewEvent};
pub use menu_item::{MenuItem, MenuItemPatch, NewMenuItem};
pub use order::{NewOrder, Order, OrderItem, OrderPatch};
