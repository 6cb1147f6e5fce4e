use crate::events::EventDirectory;
use crate::menu::MenuManager;
use crate::orders::OrderComposer;
use crate::store::SharedClient;
use crate::sync::QueryCache;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub queries: QueryCache,
    pub events: EventDirectory,
    pub menu: MenuManager,
    pub orders: OrderComposer,
}

impl AppState {
    /// Must be called from within a Tokio runtime.
    pub fn new(client: SharedClient) -> Self {
        let queries = QueryCache::new(client);
        Self {
            events: EventDirectory::new(queries.clone()),
            menu: MenuManager::new(queries.clone()),
            orders: OrderComposer::new(queries.clone()),
            queries,
        }
    }
}
