use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::store::{subscribe_changes, Filter, SharedClient, StoreError, Subscription, Table};

pub(crate) type Fetcher<T> =
    Arc<dyn Fn(SharedClient) -> BoxFuture<'static, Result<T, StoreError>> + Send + Sync>;

/// Identity of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Events,
    Event(i64),
    Menu(i64),
    Categories(i64),
    Orders(i64),
}

impl QueryKey {
    pub fn table(&self) -> Table {
        match self {
            QueryKey::Events | QueryKey::Event(_) => Table::Events,
            QueryKey::Menu(_) => Table::Menu,
            QueryKey::Categories(_) => Table::MenuCategories,
            QueryKey::Orders(_) => Table::Orders,
        }
    }

    /// Rows of [`Self::table`] this query depends on.
    pub fn filter(&self) -> Option<Filter> {
        match self {
            QueryKey::Events => None,
            QueryKey::Event(id) => Some(Filter::eq("id", *id)),
            QueryKey::Menu(event_id) | QueryKey::Categories(event_id) | QueryKey::Orders(event_id) => {
                Some(Filter::eq("event_id", *event_id))
            }
        }
    }

    pub fn event_id(&self) -> Option<i64> {
        match self {
            QueryKey::Events => None,
            QueryKey::Event(id)
            | QueryKey::Menu(id)
            | QueryKey::Categories(id)
            | QueryKey::Orders(id) => Some(*id),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Events => f.write_str("events"),
            QueryKey::Event(id) => write!(f, "event-{}", id),
            QueryKey::Menu(id) => write!(f, "menu-{}", id),
            QueryKey::Categories(id) => write!(f, "categories-{}", id),
            QueryKey::Orders(id) => write!(f, "orders-{}", id),
        }
    }
}

/// Snapshot of a query: last good data, whether a fetch is running, and the
/// error of the last fetch if it failed. Data survives failed fetches unless
/// the backend reported the rows as not found.
#[derive(Debug)]
pub struct QueryState<T> {
    pub data: Option<Arc<T>>,
    pub is_loading: bool,
    pub error: Option<StoreError>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_loading: false,
            error: None,
        }
    }
}

struct Inner<T> {
    key: QueryKey,
    client: SharedClient,
    fetcher: Fetcher<T>,
    state: RwLock<QueryState<T>>,
    version: watch::Sender<u64>,
    // Serializes fetches so an older response never lands after a newer one.
    revalidation: Mutex<()>,
}

impl<T: Send + Sync + 'static> Inner<T> {
    async fn revalidate(&self, only_if_empty: bool) -> Result<Arc<T>, StoreError> {
        let _guard = self.revalidation.lock().await;
        if only_if_empty {
            if let Some(data) = self.state.read().data.clone() {
                return Ok(data);
            }
        }

        self.state.write().is_loading = true;
        let result = (self.fetcher)(self.client.clone()).await;

        let outcome = {
            let mut state = self.state.write();
            state.is_loading = false;
            match result {
                Ok(data) => {
                    let data = Arc::new(data);
                    state.data = Some(data.clone());
                    state.error = None;
                    Ok(data)
                }
                // The rows are gone: stale data would outlive them.
                Err(e @ StoreError::NotFound { .. }) => {
                    state.data = None;
                    state.error = Some(e.clone());
                    Err(e)
                }
                Err(e) => {
                    state.error = Some(e.clone());
                    Err(e)
                }
            }
        };
        self.bump();

        if let Err(e) = &outcome {
            debug!(query = %self.key, error = %e, "Revalidation failed");
        }
        outcome
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Keeps the change-feed listener of a query alive.
struct Listener {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handle to a cached, self-revalidating query.
///
/// Clones share the same cache entry. The change-feed subscription lives
/// until the last clone is dropped.
pub struct Query<T> {
    inner: Arc<Inner<T>>,
    listener: Arc<Listener>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            listener: self.listener.clone(),
        }
    }
}

impl<T: Send + Sync + 'static> Query<T> {
    /// Creates the entry and subscribes it to changes matching the key.
    /// Must be called from within a Tokio runtime.
    pub(crate) fn new(key: QueryKey, client: SharedClient, fetcher: Fetcher<T>) -> Self {
        let (version, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            key,
            client: client.clone(),
            fetcher,
            state: RwLock::new(QueryState::default()),
            version,
            revalidation: Mutex::new(()),
        });

        // Bursts of notifications collapse into one stored permit.
        let pending = Arc::new(Notify::new());
        let trigger = pending.clone();
        let subscription = subscribe_changes(client.as_ref(), key.table(), key.filter(), move |_| {
            trigger.notify_one();
        });

        let weak = Arc::downgrade(&inner);
        let task = tokio::spawn(async move {
            loop {
                pending.notified().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                debug!(query = %inner.key, "Change received, revalidating");
                // Failures are recorded in the state; no retry.
                let _ = inner.revalidate(false).await;
            }
        });

        Self {
            inner,
            listener: Arc::new(Listener { subscription, task }),
        }
    }

    pub fn key(&self) -> QueryKey {
        self.inner.key
    }

    pub fn subscription_id(&self) -> uuid::Uuid {
        self.listener.subscription.id()
    }

    pub fn state(&self) -> QueryState<T> {
        self.inner.state.read().clone()
    }

    /// Cached data, fetching it first when nothing has been loaded yet.
    pub async fn data(&self) -> Result<Arc<T>, StoreError> {
        if let Some(data) = self.inner.state.read().data.clone() {
            return Ok(data);
        }
        self.inner.revalidate(true).await
    }

    /// Forces a refetch without waiting for a change notification.
    pub async fn mutate(&self) -> Result<Arc<T>, StoreError> {
        self.inner.revalidate(false).await
    }

    /// Replaces the cached data locally, ahead of the backend.
    pub fn set_data(&self, data: T) {
        self.inner.state.write().data = Some(Arc::new(data));
        self.inner.bump();
    }

    /// Receiver that changes whenever the cached state does.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }
}
