use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    /// Dense 1-based display rank within the event.
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMenuCategory {
    pub event_id: i64,
    pub name: String,
    pub position: i32,
}
