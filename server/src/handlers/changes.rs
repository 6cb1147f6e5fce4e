use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;
use crate::store::{subscribe_changes, Filter, Notice, Subscription, Table};
use crate::utils::AppError;

fn to_sse(notice: Notice) -> SseEvent {
    match notice {
        Notice::Change(change) => match SseEvent::default().event("change").json_data(&change) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Could not encode change, asking client to resync");
                SseEvent::default().event("resync")
            }
        },
        Notice::Missed(count) => SseEvent::default()
            .event("resync")
            .data(count.to_string()),
    }
}

/// Server-sent stream of every change to the event and its menu,
/// categories and orders. A `resync` event means notifications were lost.
pub async fn stream_changes(
    State(state): State<AppState>,
    Path(event_id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    state.events.get_event(event_id).await?;

    let (tx, rx) = mpsc::unbounded_channel();
    let client = state.queries.client();
    let scopes = [
        (Table::Events, Filter::eq("id", event_id)),
        (Table::Menu, Filter::eq("event_id", event_id)),
        (Table::MenuCategories, Filter::eq("event_id", event_id)),
        (Table::Orders, Filter::eq("event_id", event_id)),
    ];
    let subscriptions: Vec<Subscription> = scopes
        .into_iter()
        .map(|(table, filter)| {
            let tx = tx.clone();
            subscribe_changes(client.as_ref(), table, Some(filter), move |notice| {
                let _ = tx.send(notice);
            })
        })
        .collect();
    debug!(event_id, "Change stream opened");

    // The subscriptions live as long as the stream does.
    let stream = stream::unfold((rx, subscriptions), |(mut rx, subscriptions)| async move {
        let notice = rx.recv().await?;
        Some((Ok(to_sse(notice)), (rx, subscriptions)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
