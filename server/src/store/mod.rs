//! Persistence client.
//!
//! The rest of the crate talks to storage only through [`PersistenceClient`]:
//! generic CRUD over JSON rows plus a broadcast change feed. Two backends are
//! provided, [`MemoryStore`] and [`PgStore`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod memory;
pub mod postgres;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use subscription::{subscribe_changes, Notice, Subscription};

/// A JSON object as stored in a table.
pub type Row = Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Events,
    Menu,
    MenuCategories,
    Orders,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Events,
        Table::Menu,
        Table::MenuCategories,
        Table::Orders,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Events => "events",
            Table::Menu => "menu",
            Table::MenuCategories => "menu_categories",
            Table::Orders => "orders",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Events => &["id", "title", "date"],
            Table::Menu => &[
                "id",
                "event_id",
                "category_id",
                "title",
                "price",
                "terminated",
                "position",
            ],
            Table::MenuCategories => &["id", "event_id", "name", "position"],
            Table::Orders => &[
                "id",
                "event_id",
                "customer_name",
                "items",
                "total",
                "created_at",
            ],
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    pub fn parse(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row predicate understood by every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Filter::Eq(column, value.into())
    }

    pub fn any_of<I, V>(column: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(column, values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(column, _) | Filter::In(column, _) => *column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::Eq(column, value) => row.get(*column) == Some(value),
            Filter::In(column, values) => row
                .get(*column)
                .map(|v| values.contains(v))
                .unwrap_or(false),
        }
    }

    pub(crate) fn check(&self, table: Table) -> Result<(), StoreError> {
        if table.has_column(self.column()) {
            Ok(())
        } else {
            Err(StoreError::UnknownColumn {
                table,
                column: self.column().to_string(),
            })
        }
    }
}

pub fn matches_all(filters: &[Filter], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Notification published after a row changed.
///
/// `record` is the new row for inserts and updates and the removed row for
/// deletes. The Postgres backend sends only the `id` and `event_id` columns
/// of both images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub record: Row,
    #[serde(default)]
    pub old_record: Option<Row>,
}

impl ChangeEvent {
    /// True when either the new or the old image of the row passes `filter`.
    pub fn touches(&self, filter: &Filter) -> bool {
        filter.matches(&self.record)
            || self
                .old_record
                .as_ref()
                .map(|old| filter.matches(old))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("no matching row in {table}")]
    NotFound { table: Table },

    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: Table, column: String },

    #[error("could not decode row: {0}")]
    Decode(String),

    #[error("backend unavailable")]
    Unavailable,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::Unavailable,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Decode(e.to_string())
    }
}

#[async_trait]
pub trait PersistenceClient: Send + Sync + 'static {
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError>;

    /// Applies `patch` (a JSON object of column values) to every matching row.
    async fn update(&self, table: Table, patch: Row, filters: &[Filter])
        -> Result<Vec<Row>, StoreError>;

    /// Returns the number of removed rows.
    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        conflict_key: &'static str,
    ) -> Result<Vec<Row>, StoreError>;

    /// A fresh receiver on the change feed of every table.
    fn changes(&self) -> broadcast::Receiver<ChangeEvent>;
}

pub type SharedClient = Arc<dyn PersistenceClient>;

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

pub fn decode_one<T: DeserializeOwned>(table: Table, rows: Vec<Row>) -> Result<T, StoreError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound { table })?;
    Ok(serde_json::from_value(row)?)
}

pub fn encode_row<T: Serialize>(value: &T) -> Result<Row, StoreError> {
    let row = serde_json::to_value(value)?;
    if row.is_object() {
        Ok(row)
    } else {
        Err(StoreError::Decode("row must be a JSON object".to_string()))
    }
}

/// Checks that every key of a row or patch is a known column of `table`.
pub(crate) fn check_columns(table: Table, row: &Row) -> Result<(), StoreError> {
    let object = row
        .as_object()
        .ok_or_else(|| StoreError::Decode("row must be a JSON object".to_string()))?;
    match object.keys().find(|key| !table.has_column(key)) {
        Some(column) => Err(StoreError::UnknownColumn {
            table,
            column: column.clone(),
        }),
        None => Ok(()),
    }
}
