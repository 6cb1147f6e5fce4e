use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{Event, NewEvent};
use crate::store::{decode_one, encode_row, Filter, StoreError, Table};
use crate::sync::QueryCache;
use crate::utils::AppError;

/// Events that menus and orders hang off.
#[derive(Clone)]
pub struct EventDirectory {
    queries: QueryCache,
}

impl EventDirectory {
    pub fn new(queries: QueryCache) -> Self {
        Self { queries }
    }

    async fn refresh_list(&self) {
        if let Err(e) = self.queries.use_events().mutate().await {
            warn!(error = %e, "Could not refresh events");
        }
    }

    pub async fn create_event(
        &self,
        title: &str,
        date: Option<DateTime<Utc>>,
    ) -> Result<Event, AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::validation("Title is required"));
        }
        let date = date.ok_or_else(|| AppError::validation("Date is required"))?;

        let row = encode_row(&NewEvent {
            title: title.to_string(),
            date,
        })?;
        let rows = self.queries.client().insert(Table::Events, vec![row]).await?;
        let event: Event = decode_one(Table::Events, rows)?;

        info!(event_id = event.id, "Event created");
        self.refresh_list().await;
        Ok(event)
    }

    pub async fn list_events(&self) -> Result<Arc<Vec<Event>>, AppError> {
        Ok(self.queries.use_events().data().await?)
    }

    pub async fn get_event(&self, event_id: i64) -> Result<Event, AppError> {
        match self.queries.require_event(event_id).await {
            Ok(event) => Ok(event.as_ref().clone()),
            Err(StoreError::NotFound { .. }) => {
                Err(AppError::NotFound(format!("Event {}", event_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes the event after its orders, menu and categories.
    pub async fn delete_event(&self, event_id: i64) -> Result<(), AppError> {
        self.get_event(event_id).await?;

        let client = self.queries.client();
        let children = [Filter::eq("event_id", event_id)];
        let orders = client.delete(Table::Orders, &children).await?;
        let items = client.delete(Table::Menu, &children).await?;
        let categories = client.delete(Table::MenuCategories, &children).await?;
        client
            .delete(Table::Events, &[Filter::eq("id", event_id)])
            .await?;

        info!(event_id, orders, items, categories, "Event deleted");
        self.queries.evict_event(event_id);
        self.refresh_list().await;
        Ok(())
    }
}
