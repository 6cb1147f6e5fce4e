use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ChangeEvent, Filter, PersistenceClient, Table};

/// What a subscriber is told.
#[derive(Debug, Clone)]
pub enum Notice {
    Change(ChangeEvent),
    /// The feed overflowed and this many notifications were dropped. Anything
    /// derived from the table should be refetched.
    Missed(u64),
}

/// A live change-feed listener. Dropping it stops the listener.
pub struct Subscription {
    id: Uuid,
    table: Table,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(subscription = %self.id, table = %self.table, "Unsubscribed from change feed");
    }
}

/// Invokes `callback` for every change on `table` whose row matches `filter`.
///
/// Must be called from within a Tokio runtime.
pub fn subscribe_changes<F>(
    client: &dyn PersistenceClient,
    table: Table,
    filter: Option<Filter>,
    mut callback: F,
) -> Subscription
where
    F: FnMut(Notice) + Send + 'static,
{
    let id = Uuid::new_v4();
    let mut rx = client.changes();

    let handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if change.table != table {
                        continue;
                    }
                    if filter.as_ref().map_or(true, |f| change.touches(f)) {
                        callback(Notice::Change(change));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(subscription = %id, table = %table, skipped, "Change feed lagged");
                    callback(Notice::Missed(skipped));
                }
                Err(RecvError::Closed) => {
                    debug!(subscription = %id, table = %table, "Change feed closed");
                    break;
                }
            }
        }
    });

    debug!(subscription = %id, table = %table, "Subscribed to change feed");
    Subscription { id, table, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_only_matching_changes_are_delivered() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = subscribe_changes(&store, Table::Menu, Some(Filter::eq("event_id", 1)), move |n| {
            let _ = tx.send(n);
        });

        store
            .insert(Table::Menu, vec![json!({"event_id": 2, "title": "Other", "price": 1})])
            .await
            .unwrap();
        store
            .insert(Table::Orders, vec![json!({"event_id": 1, "customer_name": "Ada"})])
            .await
            .unwrap();
        store
            .insert(Table::Menu, vec![json!({"event_id": 1, "title": "Mine", "price": 2})])
            .await
            .unwrap();

        let notice = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        match notice {
            Notice::Change(change) => assert_eq!(change.record["title"], json!("Mine")),
            Notice::Missed(_) => panic!("unexpected lag"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_delivery() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = subscribe_changes(&store, Table::Events, None, move |n| {
            let _ = tx.send(n);
        });
        sub.unsubscribe();

        store
            .insert(Table::Events, vec![json!({"title": "Late"})])
            .await
            .unwrap();

        // The sender lived inside the aborted task, so the channel closes.
        assert!(timeout(Duration::from_secs(1), rx.recv()).await.unwrap().is_none());
    }
}
