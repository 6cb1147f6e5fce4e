use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use super::query::{Fetcher, Query, QueryKey};
use crate::models::{Event, MenuCategory, MenuItem, Order};
use crate::store::{
    decode_one, decode_rows, subscribe_changes, ChangeKind, Filter, Notice, SharedClient,
    StoreError, Subscription, Table,
};

type Registry<T> = Mutex<HashMap<QueryKey, Query<T>>>;

struct CacheInner {
    client: SharedClient,
    // Evicts the queries of events deleted anywhere on the backend.
    _janitor: Subscription,
    events: Registry<Vec<Event>>,
    event: Registry<Event>,
    menus: Registry<Vec<MenuItem>>,
    categories: Registry<Vec<MenuCategory>>,
    orders: Registry<Vec<Order>>,
}

impl CacheInner {
    fn evict_event(&self, event_id: i64) {
        let scoped = |key: &QueryKey| key.event_id() != Some(event_id);
        self.event.lock().retain(|key, _| scoped(key));
        self.menus.lock().retain(|key, _| scoped(key));
        self.categories.lock().retain(|key, _| scoped(key));
        self.orders.lock().retain(|key, _| scoped(key));
        debug!(event_id, "Evicted event queries");
    }

    fn on_event_change(&self, notice: Notice) {
        // Entries of missed deletes are dropped by `require_event` on their
        // next use.
        let Notice::Change(change) = notice else {
            return;
        };
        if change.kind != ChangeKind::Delete {
            return;
        }
        match change.record.get("id").and_then(Value::as_i64) {
            Some(event_id) => self.evict_event(event_id),
            None => warn!("Event delete notification without an id"),
        }
    }
}

/// Process-wide registry of queries keyed by [`QueryKey`]. The same key always
/// yields a handle on the same entry.
///
/// Entries scoped to an event live as long as the event does: they are
/// evicted when the event is deleted, here or on the backend, and when
/// [`QueryCache::require_event`] finds it missing.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    /// Must be called from within a Tokio runtime.
    pub fn new(client: SharedClient) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<CacheInner>| {
            let weak = weak.clone();
            let janitor = subscribe_changes(client.as_ref(), Table::Events, None, move |notice| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event_change(notice);
                }
            });
            CacheInner {
                client,
                _janitor: janitor,
                events: Mutex::default(),
                event: Mutex::default(),
                menus: Mutex::default(),
                categories: Mutex::default(),
                orders: Mutex::default(),
            }
        });
        Self { inner }
    }

    pub fn client(&self) -> &SharedClient {
        &self.inner.client
    }

    fn entry<T, F>(&self, registry: &Registry<T>, key: QueryKey, fetcher: F) -> Query<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fetcher<T>,
    {
        registry
            .lock()
            .entry(key)
            .or_insert_with(|| {
                debug!(query = %key, "Creating query");
                Query::new(key, self.inner.client.clone(), fetcher())
            })
            .clone()
    }

    pub fn use_events(&self) -> Query<Vec<Event>> {
        self.entry(&self.inner.events, QueryKey::Events, || {
            Arc::new(|client| fetch_events(client).boxed())
        })
    }

    pub fn use_event(&self, event_id: i64) -> Query<Event> {
        self.entry(&self.inner.event, QueryKey::Event(event_id), || {
            Arc::new(move |client| fetch_event(client, event_id).boxed())
        })
    }

    pub fn use_menu(&self, event_id: i64) -> Query<Vec<MenuItem>> {
        self.entry(&self.inner.menus, QueryKey::Menu(event_id), || {
            Arc::new(move |client| fetch_menu(client, event_id).boxed())
        })
    }

    pub fn use_categories(&self, event_id: i64) -> Query<Vec<MenuCategory>> {
        self.entry(&self.inner.categories, QueryKey::Categories(event_id), || {
            Arc::new(move |client| fetch_categories(client, event_id).boxed())
        })
    }

    pub fn use_orders(&self, event_id: i64) -> Query<Vec<Order>> {
        self.entry(&self.inner.orders, QueryKey::Orders(event_id), || {
            Arc::new(move |client| fetch_orders(client, event_id).boxed())
        })
    }

    /// The event, loaded through its cached query. When the event does not
    /// exist every query scoped to it is evicted, so lookups of unknown ids
    /// leave nothing behind.
    ///
    /// Call this before touching the menu, categories or orders of an event.
    pub async fn require_event(&self, event_id: i64) -> Result<Arc<Event>, StoreError> {
        let result = self.use_event(event_id).data().await;
        if let Err(StoreError::NotFound { .. }) = &result {
            self.evict_event(event_id);
        }
        result
    }

    /// Drops every query scoped to `event_id`, tearing down their
    /// subscriptions once no other handle is alive.
    pub fn evict_event(&self, event_id: i64) {
        self.inner.evict_event(event_id);
    }

    pub fn len(&self) -> usize {
        self.inner.events.lock().len()
            + self.inner.event.lock().len()
            + self.inner.menus.lock().len()
            + self.inner.categories.lock().len()
            + self.inner.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn fetch_events(client: SharedClient) -> Result<Vec<Event>, StoreError> {
    let mut events: Vec<Event> = decode_rows(client.select(Table::Events, &[]).await?)?;
    events.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
    Ok(events)
}

async fn fetch_event(client: SharedClient, event_id: i64) -> Result<Event, StoreError> {
    let rows = client
        .select(Table::Events, &[Filter::eq("id", event_id)])
        .await?;
    decode_one(Table::Events, rows)
}

async fn fetch_menu(client: SharedClient, event_id: i64) -> Result<Vec<MenuItem>, StoreError> {
    let rows = client
        .select(Table::Menu, &[Filter::eq("event_id", event_id)])
        .await?;
    decode_rows(rows)
}

async fn fetch_categories(
    client: SharedClient,
    event_id: i64,
) -> Result<Vec<MenuCategory>, StoreError> {
    let rows = client
        .select(Table::MenuCategories, &[Filter::eq("event_id", event_id)])
        .await?;
    let mut categories: Vec<MenuCategory> = decode_rows(rows)?;
    categories.sort_by_key(|c| (c.position, c.id));
    Ok(categories)
}

async fn fetch_orders(client: SharedClient, event_id: i64) -> Result<Vec<Order>, StoreError> {
    let rows = client
        .select(Table::Orders, &[Filter::eq("event_id", event_id)])
        .await?;
    let mut orders: Vec<Order> = decode_rows(rows)?;
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(orders)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, PersistenceClient};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn seeded() -> (Arc<MemoryStore>, QueryCache) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(
                Table::Events,
                vec![
                    json!({"title": "Late", "date": "2025-06-01T18:00:00Z"}),
                    json!({"title": "Early", "date": "2025-05-01T18:00:00Z"}),
                ],
            )
            .await
            .unwrap();
        store
            .insert(
                Table::MenuCategories,
                vec![
                    json!({"event_id": 1, "name": "Dolci", "position": 2}),
                    json!({"event_id": 1, "name": "Primi", "position": 1}),
                ],
            )
            .await
            .unwrap();
        store
            .insert(
                Table::Orders,
                vec![
                    json!({"event_id": 1, "customer_name": "First", "items": [], "total": 0, "created_at": "2025-06-01T18:00:00Z"}),
                    json!({"event_id": 1, "customer_name": "Second", "items": [], "total": 0, "created_at": "2025-06-01T19:00:00Z"}),
                ],
            )
            .await
            .unwrap();
        let cache = QueryCache::new(store.clone());
        (store, cache)
    }

    #[tokio::test]
    async fn test_same_key_shares_entry() {
        let (_store, cache) = seeded().await;
        let a = cache.use_menu(1);
        let b = cache.use_menu(1);
        assert_eq!(a.subscription_id(), b.subscription_id());
        assert_ne!(a.subscription_id(), cache.use_menu(2).subscription_id());
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_ordering() {
        let (_store, cache) = seeded().await;

        let events = cache.use_events().data().await.unwrap();
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Late"]);

        let categories = cache.use_categories(1).data().await.unwrap();
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Primi", "Dolci"]);

        let orders = cache.use_orders(1).data().await.unwrap();
        let customers: Vec<&str> = orders.iter().map(|o| o.customer_name.as_str()).collect();
        assert_eq!(customers, vec!["Second", "First"]);
    }

    #[tokio::test]
    async fn test_missing_event_is_not_found() {
        let (_store, cache) = seeded().await;
        assert_eq!(
            cache.use_event(42).data().await.unwrap_err(),
            StoreError::NotFound { table: Table::Events }
        );
        assert_eq!(cache.use_event(2).data().await.unwrap().title, "Early");
    }

    #[tokio::test]
    async fn test_evict_event_only_touches_that_event() {
        let (_store, cache) = seeded().await;
        cache.use_events();
        cache.use_menu(1);
        cache.use_orders(1);
        cache.use_menu(2);

        cache.evict_event(1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_events_leave_no_entries() {
        let (_store, cache) = seeded().await;
        for event_id in 100..600 {
            assert!(matches!(
                cache.require_event(event_id).await,
                Err(StoreError::NotFound { .. })
            ));
        }
        assert!(cache.is_empty());

        cache.require_event(1).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_delete_evicts_event_queries() {
        let (store, cache) = seeded().await;
        cache.require_event(1).await.unwrap();
        cache.use_menu(1).data().await.unwrap();
        cache.use_orders(1).data().await.unwrap();
        cache.use_menu(2);
        assert_eq!(cache.len(), 4);

        store.delete(Table::Events, &[Filter::eq("id", 1)]).await.unwrap();

        let evicted = async {
            while cache.len() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        timeout(Duration::from_secs(2), evicted)
            .await
            .expect("queries of the deleted event were kept");
        assert_eq!(
            cache.require_event(1).await.unwrap_err(),
            StoreError::NotFound { table: Table::Events }
        );
    }
}
