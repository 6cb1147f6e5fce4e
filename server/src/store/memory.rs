use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::{
    check_columns, matches_all, ChangeEvent, ChangeKind, Filter, PersistenceClient, Row,
    StoreError, Table,
};

const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;

#[derive(Default)]
struct TableData {
    rows: Vec<Row>,
    next_id: i64,
}

impl TableData {
    fn position_of(&self, column: &str, value: &Value) -> Option<usize> {
        self.rows.iter().position(|row| row.get(column) == Some(value))
    }

    /// Fills the columns the database would default and assigns an id.
    fn prepare(&mut self, table: Table, mut object: Map<String, Value>) -> Result<Row, StoreError> {
        let id = match object.get("id").and_then(Value::as_i64) {
            Some(id) => {
                if self.position_of("id", &Value::from(id)).is_some() {
                    return Err(StoreError::Backend(format!(
                        "duplicate key value violates unique constraint on {}.id",
                        table
                    )));
                }
                id
            }
            None => self.next_id + 1,
        };
        self.next_id = self.next_id.max(id);
        object.insert("id".to_string(), Value::from(id));

        match table {
            Table::Menu => {
                object
                    .entry("terminated")
                    .or_insert(Value::Bool(false));
            }
            Table::Orders => {
                object
                    .entry("created_at")
                    .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
            }
            Table::Events | Table::MenuCategories => {}
        }
        for column in table.columns() {
            object.entry(column.to_string()).or_insert(Value::Null);
        }

        Ok(Value::Object(object))
    }
}

/// In-process backend: tables are vectors of JSON rows and every write is
/// published on a broadcast change feed.
pub struct MemoryStore {
    tables: RwLock<HashMap<Table, TableData>>,
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tables: RwLock::new(HashMap::new()),
            tx,
        }
    }

    fn publish(&self, table: Table, kind: ChangeKind, record: Row, old_record: Option<Row>) {
        // No subscribers is not an error.
        let _ = self.tx.send(ChangeEvent {
            table,
            kind,
            record,
            old_record,
        });
    }
}

fn into_object(table: Table, row: Row) -> Result<Map<String, Value>, StoreError> {
    check_columns(table, &row)?;
    match row {
        Value::Object(object) => Ok(object),
        _ => Err(StoreError::Decode("row must be a JSON object".to_string())),
    }
}

fn merge(target: &mut Row, patch: &Map<String, Value>) {
    if let Value::Object(object) = target {
        for (column, value) in patch {
            object.insert(column.clone(), value.clone());
        }
    }
}

fn check_filters(table: Table, filters: &[Filter]) -> Result<(), StoreError> {
    filters.iter().try_for_each(|f| f.check(table))
}

#[async_trait]
impl PersistenceClient for MemoryStore {
    async fn select(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        check_filters(table, filters)?;
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table)
            .map(|data| {
                data.rows
                    .iter()
                    .filter(|row| matches_all(filters, row))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, StoreError> {
        let objects = rows
            .into_iter()
            .map(|row| into_object(table, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = self.tables.write().await;
        let data = tables.entry(table).or_default();
        let (len, next_id) = (data.rows.len(), data.next_id);
        let mut inserted = Vec::with_capacity(objects.len());
        for object in objects {
            match data.prepare(table, object) {
                Ok(row) => {
                    data.rows.push(row.clone());
                    inserted.push(row);
                }
                Err(e) => {
                    data.rows.truncate(len);
                    data.next_id = next_id;
                    return Err(e);
                }
            }
        }
        drop(tables);

        for row in &inserted {
            self.publish(table, ChangeKind::Insert, row.clone(), None);
        }
        Ok(inserted)
    }

    async fn update(
        &self,
        table: Table,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, StoreError> {
        check_filters(table, filters)?;
        let patch = into_object(table, patch)?;

        let mut tables = self.tables.write().await;
        let mut changed = Vec::new();
        if let Some(data) = tables.get_mut(&table) {
            for row in data.rows.iter_mut().filter(|row| matches_all(filters, row)) {
                let old = row.clone();
                merge(row, &patch);
                changed.push((row.clone(), old));
            }
        }
        drop(tables);

        Ok(changed
            .into_iter()
            .map(|(row, old)| {
                self.publish(table, ChangeKind::Update, row.clone(), Some(old));
                row
            })
            .collect())
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<u64, StoreError> {
        check_filters(table, filters)?;

        let mut tables = self.tables.write().await;
        let removed = match tables.get_mut(&table) {
            Some(data) => {
                let (removed, kept): (Vec<Row>, Vec<Row>) = data
                    .rows
                    .drain(..)
                    .partition(|row| matches_all(filters, row));
                data.rows = kept;
                removed
            }
            None => Vec::new(),
        };
        drop(tables);

        let count = removed.len() as u64;
        for row in removed {
            self.publish(table, ChangeKind::Delete, row, None);
        }
        Ok(count)
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        conflict_key: &'static str,
    ) -> Result<Vec<Row>, StoreError> {
        Filter::eq(conflict_key, Value::Null).check(table)?;
        let objects = rows
            .into_iter()
            .map(|row| into_object(table, row))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = self.tables.write().await;
        let data = tables.entry(table).or_default();
        let (before, next_id) = (data.rows.clone(), data.next_id);
        let mut written = Vec::with_capacity(objects.len());
        for object in objects {
            let existing = object
                .get(conflict_key)
                .and_then(|key| data.position_of(conflict_key, key));
            match existing {
                Some(index) => {
                    let old = data.rows[index].clone();
                    merge(&mut data.rows[index], &object);
                    written.push((ChangeKind::Update, data.rows[index].clone(), Some(old)));
                }
                None => match data.prepare(table, object) {
                    Ok(row) => {
                        data.rows.push(row.clone());
                        written.push((ChangeKind::Insert, row, None));
                    }
                    Err(e) => {
                        data.rows = before;
                        data.next_id = next_id;
                        return Err(e);
                    }
                },
            }
        }
        drop(tables);

        Ok(written
            .into_iter()
            .map(|(kind, row, old)| {
                self.publish(table, kind, row.clone(), old);
                row
            })
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}
