//! PostgreSQL backend.
//!
//! Rows cross the wire as `jsonb`: reads use `to_jsonb(t)`, writes go through
//! `jsonb_populate_record` so only whitelisted columns ever reach the SQL
//! text. Change notifications are produced by the `notify_table_change`
//! trigger (see `migrations/`) and forwarded from a `PgListener` onto the
//! broadcast feed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{check_columns, ChangeEvent, Filter, PersistenceClient, Row, StoreError, Table};

/// Channel used by the `notify_table_change` trigger.
pub const CHANGE_CHANNEL: &str = "table_changes";

const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PgStore {
    pool: PgPool,
    tx: broadcast::Sender<ChangeEvent>,
    listener: JoinHandle<()>,
}

impl PgStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        feed_capacity: usize,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Self::from_pool(pool, feed_capacity).await
    }

    pub async fn from_pool(pool: PgPool, feed_capacity: usize) -> Result<Self, StoreError> {
        let (tx, _) = broadcast::channel(feed_capacity.max(1));

        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;
        let listener = tokio::spawn(forward_notifications(listener, tx.clone()));
        info!(channel = CHANGE_CHANNEL, "Listening for table changes");

        Ok(Self { pool, tx, listener })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn forward_notifications(mut listener: PgListener, tx: broadcast::Sender<ChangeEvent>) {
    loop {
        match listener.recv().await {
            Ok(notification) => match decode_notification(notification.payload()) {
                Ok(change) => {
                    let _ = tx.send(change);
                }
                Err(e) => warn!(error = %e, "Ignoring malformed change notification"),
            },
            Err(e) => {
                error!(error = ?e, "Change listener failed");
                tokio::time::sleep(LISTENER_RETRY_DELAY).await;
            }
        }
    }
}

/// Payloads carry only `id` and `event_id` of the row images, enough for
/// [`Filter`] matching.
fn decode_notification(payload: &str) -> serde_json::Result<ChangeEvent> {
    serde_json::from_str(payload)
}

fn quote(column: &str) -> String {
    format!("\"{}\"", column)
}

fn column_list(columns: &[&str]) -> String {
    columns.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ")
}

/// Renders `filters` as a `WHERE` body, pushing bind values onto `args`.
fn where_clause(table: Table, filters: &[Filter], args: &mut Vec<Value>) -> Result<String, StoreError> {
    if filters.is_empty() {
        return Ok("TRUE".to_string());
    }
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        filter.check(table)?;
        match filter {
            Filter::Eq(column, value) => {
                args.push(value.clone());
                parts.push(format!("to_jsonb(t) -> '{}' = ${}", column, args.len()));
            }
            Filter::In(column, values) => {
                args.push(Value::Array(values.clone()));
                parts.push(format!(
                    "to_jsonb(t) -> '{}' IN (SELECT jsonb_array_elements(${}))",
                    column,
                    args.len()
                ));
            }
        }
    }
    Ok(parts.join(" AND "))
}

/// Column names of a row, already checked against the table whitelist.
fn row_columns(table: Table, row: &Row) -> Result<Vec<&'static str>, StoreError> {
    check_columns(table, row)?;
    let object: &Map<String, Value> = row
        .as_object()
        .ok_or_else(|| StoreError::Decode("row must be a JSON object".to_string()))?;
    Ok(table
        .columns()
        .iter()
        .copied()
        .filter(|c| object.contains_key(*c))
        .collect())
}

fn insert_sql(table: Table, columns: &[&str]) -> String {
    if columns.is_empty() {
        return format!("INSERT INTO {} AS t DEFAULT VALUES RETURNING to_jsonb(t.*)", table);
    }
    let cols = column_list(columns);
    format!(
        "INSERT INTO {table} AS t ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) RETURNING to_jsonb(t.*)",
        table = table,
        cols = cols
    )
}

async fn fetch_rows<'e, E>(executor: E, sql: &str, args: Vec<Value>) -> Result<Vec<Row>, StoreError>
where
    E: sqlx::PgExecutor<'e>,
{
    let mut query = sqlx::query_scalar::<_, Value>(sql);
    for arg in args {
        query = query.bind(arg);
    }
    Ok(query.fetch_all(executor).await?)
}

#[async_trait]
impl PersistenceClient for PgStore {
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let mut args = Vec::new();
        let predicate = where_clause(table, filters, &mut args)?;
        let sql = format!(
            "SELECT to_jsonb(t) FROM {} AS t WHERE {} ORDER BY t.id",
            table, predicate
        );
        fetch_rows(&self.pool, &sql, args).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let columns = row_columns(table, &row)?;
            let sql = insert_sql(table, &columns);
            let args = if columns.is_empty() { Vec::new() } else { vec![row] };
            inserted.extend(fetch_rows(&mut *tx, &sql, args).await?);
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn update(
        &self,
        table: Table,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, StoreError> {
        let columns = row_columns(table, &patch)?;
        if columns.is_empty() {
            return self.select(table, filters).await;
        }
        let cols = column_list(&columns);
        let mut args = vec![patch];
        let predicate = where_clause(table, filters, &mut args)?;
        let sql = format!(
            "UPDATE {table} AS t SET ({cols}) = (SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1)) WHERE {predicate} RETURNING to_jsonb(t.*)",
            table = table,
            cols = cols,
            predicate = predicate
        );
        fetch_rows(&self.pool, &sql, args).await
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        let mut args = Vec::new();
        let predicate = where_clause(table, filters, &mut args)?;
        let sql = format!("DELETE FROM {} AS t WHERE {}", table, predicate);
        let mut query = sqlx::query(&sql);
        for arg in args {
            query = query.bind(arg);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        conflict_key: &'static str,
    ) -> Result<Vec<Row>, StoreError> {
        Filter::eq(conflict_key, Value::Null).check(table)?;
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let columns = row_columns(table, &row)?;
            let mut assignments: Vec<String> = columns
                .iter()
                .filter(|c| **c != conflict_key)
                .map(|c| format!("{col} = EXCLUDED.{col}", col = quote(c)))
                .collect();
            if assignments.is_empty() {
                assignments.push(format!("{col} = EXCLUDED.{col}", col = quote(conflict_key)));
            }
            let cols = column_list(&columns);
            let sql = format!(
                "INSERT INTO {table} AS t ({cols}) SELECT {cols} FROM jsonb_populate_record(NULL::{table}, $1) ON CONFLICT ({key}) DO UPDATE SET {set} RETURNING to_jsonb(t.*)",
                table = table,
                cols = cols,
                key = quote(conflict_key),
                set = assignments.join(", ")
            );
            written.extend(fetch_rows(&mut *tx, &sql, vec![row]).await?);
        }
        tx.commit().await?;
        Ok(written)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
