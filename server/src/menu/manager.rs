use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use super::grouping::{group_by_category, MenuSection};
use super::reorder::{reorder, sort_by_position, Positioned};
use crate::models::{MenuCategory, MenuItem, MenuItemPatch, NewMenuCategory, NewMenuItem};
use crate::store::{decode_one, decode_rows, encode_row, Filter, SharedClient, StoreError, Table};
use crate::sync::{Query, QueryCache};
use crate::utils::AppError;

fn validate_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        Err(AppError::validation("Title is required"))
    } else {
        Ok(title.to_string())
    }
}

fn validate_price(price: Option<Decimal>) -> Result<Decimal, AppError> {
    match price {
        None => Err(AppError::validation("Price is required")),
        Some(price) if price < Decimal::ZERO => {
            Err(AppError::validation("Price must not be negative"))
        }
        Some(price) => Ok(price),
    }
}

fn validate_selection(ids: &[i64], confirmed: bool) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::validation("Select at least one entry to delete"));
    }
    if !confirmed {
        return Err(AppError::validation("Deletion must be confirmed"));
    }
    Ok(())
}

fn next_position<T: Positioned>(entries: &[T]) -> i32 {
    entries
        .iter()
        .filter_map(Positioned::position)
        .max()
        .unwrap_or(0)
        + 1
}

fn not_found(what: &'static str, id: i64) -> impl FnOnce(StoreError) -> AppError {
    move |e| match e {
        StoreError::NotFound { .. } => AppError::NotFound(format!("{} {}", what, id)),
        other => other.into(),
    }
}

/// Mutations of an event's menu and its categories.
#[derive(Clone)]
pub struct MenuManager {
    queries: QueryCache,
}

impl MenuManager {
    pub fn new(queries: QueryCache) -> Self {
        Self { queries }
    }

    fn client(&self) -> &SharedClient {
        self.queries.client()
    }

    async fn refresh<T: Send + Sync + 'static>(query: &Query<T>) {
        if let Err(e) = query.mutate().await {
            warn!(query = %query.key(), error = %e, "Could not refresh after write");
        }
    }

    async fn require_event(&self, event_id: i64) -> Result<(), AppError> {
        self.queries
            .require_event(event_id)
            .await
            .map(|_| ())
            .map_err(not_found("Event", event_id))
    }

    async fn category_of_event(&self, event_id: i64, category_id: i64) -> Result<(), AppError> {
        let query = self.queries.use_categories(event_id);
        let belongs = |categories: &[MenuCategory]| categories.iter().any(|c| c.id == category_id);
        if belongs(query.data().await?.as_slice()) {
            return Ok(());
        }
        // The category may have been created elsewhere since the last fetch.
        if belongs(query.mutate().await?.as_slice()) {
            return Ok(());
        }
        Err(AppError::validation(format!(
            "Category {} does not belong to event {}",
            category_id, event_id
        )))
    }

    pub async fn add_menu_item(
        &self,
        event_id: i64,
        title: &str,
        price: Option<Decimal>,
        category_id: Option<i64>,
    ) -> Result<MenuItem, AppError> {
        let title = validate_title(title)?;
        let price = validate_price(price)?;
        let category_id = category_id.ok_or_else(|| AppError::validation("Category is required"))?;
        self.require_event(event_id).await?;
        self.category_of_event(event_id, category_id).await?;

        let menu = self.queries.use_menu(event_id);
        let item = NewMenuItem {
            event_id,
            category_id,
            title,
            price,
            terminated: false,
            position: next_position(menu.data().await?.as_slice()),
        };
        let rows = self
            .client()
            .insert(Table::Menu, vec![encode_row(&item)?])
            .await?;
        let item: MenuItem = decode_one(Table::Menu, rows)?;

        info!(item_id = item.id, event_id, "Menu item added");
        Self::refresh(&menu).await;
        Ok(item)
    }

    /// Changes title and price. Orders already placed keep their snapshot.
    pub async fn update_menu_item(
        &self,
        item_id: i64,
        title: &str,
        price: Option<Decimal>,
    ) -> Result<MenuItem, AppError> {
        let patch = MenuItemPatch {
            title: validate_title(title)?,
            price: validate_price(price)?,
        };
        let rows = self
            .client()
            .update(Table::Menu, encode_row(&patch)?, &[Filter::eq("id", item_id)])
            .await?;
        let item: MenuItem = decode_one(Table::Menu, rows).map_err(not_found("Menu item", item_id))?;

        info!(item_id, "Menu item updated");
        Self::refresh(&self.queries.use_menu(item.event_id)).await;
        Ok(item)
    }

    pub async fn toggle_status(&self, item_id: i64, terminated: bool) -> Result<MenuItem, AppError> {
        let rows = self
            .client()
            .update(
                Table::Menu,
                json!({ "terminated": terminated }),
                &[Filter::eq("id", item_id)],
            )
            .await?;
        let item: MenuItem = decode_one(Table::Menu, rows).map_err(not_found("Menu item", item_id))?;

        info!(item_id, terminated, "Menu item availability changed");
        Self::refresh(&self.queries.use_menu(item.event_id)).await;
        Ok(item)
    }

    /// Removes exactly `ids` from the event's menu. Remaining items keep
    /// their positions.
    pub async fn delete_items(
        &self,
        event_id: i64,
        ids: &[i64],
        confirmed: bool,
    ) -> Result<u64, AppError> {
        validate_selection(ids, confirmed)?;
        self.require_event(event_id).await?;
        let removed = self
            .client()
            .delete(
                Table::Menu,
                &[
                    Filter::eq("event_id", event_id),
                    Filter::any_of("id", ids.iter().copied()),
                ],
            )
            .await?;

        info!(event_id, removed, "Menu items deleted");
        Self::refresh(&self.queries.use_menu(event_id)).await;
        Ok(removed)
    }

    /// Moves one item of the event's menu (in display order) and persists
    /// the renumbered menu. The cache shows the new order straight away and
    /// is reloaded from the backend if the write fails.
    pub async fn reorder_items(
        &self,
        event_id: i64,
        drag_index: usize,
        hover_index: usize,
    ) -> Result<Vec<MenuItem>, AppError> {
        self.require_event(event_id).await?;
        let menu = self.queries.use_menu(event_id);
        self.persist_order(&menu, Table::Menu, drag_index, hover_index)
            .await
    }

    pub async fn add_category(&self, event_id: i64, name: &str) -> Result<MenuCategory, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Category name is required"));
        }
        self.require_event(event_id).await?;

        let categories = self.queries.use_categories(event_id);
        let category = NewMenuCategory {
            event_id,
            name: name.to_string(),
            position: next_position(categories.data().await?.as_slice()),
        };
        let rows = self
            .client()
            .insert(Table::MenuCategories, vec![encode_row(&category)?])
            .await?;
        let category: MenuCategory = decode_one(Table::MenuCategories, rows)?;

        info!(category_id = category.id, event_id, "Category added");
        Self::refresh(&categories).await;
        Ok(category)
    }

    /// Deletes categories. Their items stay on the menu, uncategorized.
    ///
    /// Items are detached first. If the categories cannot be deleted the
    /// items are put back, so a failure leaves the menu as it was.
    pub async fn delete_categories(
        &self,
        event_id: i64,
        ids: &[i64],
        confirmed: bool,
    ) -> Result<u64, AppError> {
        validate_selection(ids, confirmed)?;
        self.require_event(event_id).await?;
        let members = [
            Filter::eq("event_id", event_id),
            Filter::any_of("category_id", ids.iter().copied()),
        ];
        let items: Vec<MenuItem> = decode_rows(self.client().select(Table::Menu, &members).await?)?;

        self.client()
            .update(Table::Menu, json!({ "category_id": null }), &members)
            .await?;
        debug!(event_id, orphaned = items.len(), "Items moved to uncategorized");

        let scope = [
            Filter::eq("event_id", event_id),
            Filter::any_of("id", ids.iter().copied()),
        ];
        let removed = match self.client().delete(Table::MenuCategories, &scope).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(event_id, error = %e, "Category delete failed, restoring items");
                self.restore_categories(&items).await;
                Self::refresh(&self.queries.use_menu(event_id)).await;
                return Err(e.into());
            }
        };

        info!(event_id, removed, "Categories deleted");
        Self::refresh(&self.queries.use_categories(event_id)).await;
        Self::refresh(&self.queries.use_menu(event_id)).await;
        Ok(removed)
    }

    async fn restore_categories(&self, items: &[MenuItem]) {
        let mut members: HashMap<i64, Vec<i64>> = HashMap::new();
        for item in items {
            if let Some(category_id) = item.category_id {
                members.entry(category_id).or_default().push(item.id);
            }
        }
        for (category_id, item_ids) in members {
            let restored = self
                .client()
                .update(
                    Table::Menu,
                    json!({ "category_id": category_id }),
                    &[Filter::any_of("id", item_ids)],
                )
                .await;
            if let Err(e) = restored {
                error!(category_id, error = %e, "Could not restore category of items");
            }
        }
    }

    pub async fn reorder_categories(
        &self,
        event_id: i64,
        drag_index: usize,
        hover_index: usize,
    ) -> Result<Vec<MenuCategory>, AppError> {
        self.require_event(event_id).await?;
        let categories = self.queries.use_categories(event_id);
        self.persist_order(&categories, Table::MenuCategories, drag_index, hover_index)
            .await
    }

    pub async fn grouped_menu(&self, event_id: i64) -> Result<Vec<MenuSection>, AppError> {
        self.require_event(event_id).await?;
        let items = self.queries.use_menu(event_id).data().await?;
        let categories = self.queries.use_categories(event_id).data().await?;
        Ok(group_by_category(&items, &categories))
    }

    async fn persist_order<T>(
        &self,
        query: &Query<Vec<T>>,
        table: Table,
        drag_index: usize,
        hover_index: usize,
    ) -> Result<Vec<T>, AppError>
    where
        T: Positioned + Clone + serde::Serialize + Send + Sync + 'static,
    {
        let mut entries = query.data().await?.as_ref().clone();
        sort_by_position(&mut entries);
        let reordered = reorder(entries, drag_index, hover_index)?;
        let rows = reordered
            .iter()
            .map(encode_row)
            .collect::<Result<Vec<_>, _>>()?;

        query.set_data(reordered.clone());
        match self.client().upsert(table, rows, "id").await {
            Ok(_) => {
                info!(query = %query.key(), drag_index, hover_index, "Order saved");
                Self::refresh(query).await;
                Ok(reordered)
            }
            Err(e) => {
                warn!(query = %query.key(), error = %e, "Reorder failed, rolling back");
                Self::refresh(query).await;
                Err(e.into())
            }
        }
    }
}
