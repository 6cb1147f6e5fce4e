use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{categories, changes, events, health_check, menu, orders};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(events::list_events).post(events::create_event))
        .route(
            "/events/:event_id",
            get(events::get_event).delete(events::delete_event),
        )
        .route(
            "/events/:event_id/menu",
            get(menu::list_menu)
                .post(menu::add_menu_item)
                .delete(menu::delete_menu_items),
        )
        .route("/events/:event_id/menu/grouped", get(menu::grouped_menu))
        .route("/events/:event_id/menu/reorder", post(menu::reorder_menu))
        .route("/menu/:item_id", patch(menu::update_menu_item))
        .route("/menu/:item_id/status", put(menu::toggle_status))
        .route(
            "/events/:event_id/categories",
            get(categories::list_categories)
                .post(categories::add_category)
                .delete(categories::delete_categories),
        )
        .route(
            "/events/:event_id/categories/reorder",
            post(categories::reorder_categories),
        )
        .route(
            "/events/:event_id/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route(
            "/orders/:order_id",
            put(orders::update_order).delete(orders::delete_order),
        )
        .route("/events/:event_id/changes", get(changes::stream_changes))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.allowed_origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::utils::response::{ApiErrorResponse, ApiResponse};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde::de::DeserializeOwned;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            database_url: None,
            max_connections: 1,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            change_feed_capacity: 64,
            allowed_origins: "http://localhost:3000".to_string(),
            production: false,
        }
    }

    fn app() -> Router {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        create_routes(state, &test_config())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn data<T: DeserializeOwned>(body: Value) -> T {
        let envelope: ApiResponse<T> = serde_json::from_value(body).unwrap();
        assert!(envelope.success);
        envelope.data.unwrap()
    }

    async fn seeded_event(app: &Router) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/events",
            Some(json!({"title": "Sagra", "date": "2025-06-21T19:00:00Z"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        data::<Value>(body)["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<Value>(body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let app = app();
        let (status, body) = send(&app, "GET", "/events/42/menu", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ApiErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.error.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_order_flow() {
        let app = app();
        let event_id = seeded_event(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/events/{}/categories", event_id),
            Some(json!({"name": "Primi"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let category_id = data::<Value>(body)["id"].as_i64().unwrap();

        let mut item_ids = Vec::new();
        for (title, price) in [("Pasta", 5.0), ("Lasagne", 7.5), ("Polenta", 4.0)] {
            let (status, body) = send(
                &app,
                "POST",
                &format!("/events/{}/menu", event_id),
                Some(json!({"title": title, "price": price, "category_id": category_id})),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            item_ids.push(data::<Value>(body)["id"].as_i64().unwrap());
        }

        let (status, _) = send(
            &app,
            "PUT",
            &format!("/menu/{}/status", item_ids[2]),
            Some(json!({"terminated": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The sold out dish is skipped.
        let (status, body) = send(
            &app,
            "POST",
            &format!("/events/{}/orders", event_id),
            Some(json!({"customer_name": "Mario", "item_ids": [item_ids[0], item_ids[1], item_ids[2]]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let order: Value = data(body);
        assert_eq!(order["total"], json!(12.5));
        assert_eq!(order["items"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/orders/{}", order["id"]),
            Some(json!({"customer_name": "Mario", "item_ids": [item_ids[0], item_ids[0]]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<Value>(body)["total"], json!(10.0));

        let (status, body) = send(&app, "GET", &format!("/events/{}/orders", event_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<Vec<Value>>(body).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_order_is_rejected() {
        let app = app();
        let event_id = seeded_event(&app).await;

        let (status, body) = send(
            &app,
            "POST",
            &format!("/events/{}/orders", event_id),
            Some(json!({"customer_name": "  ", "item_ids": []})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ApiErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.error.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_grouped_menu_and_reorder() {
        let app = app();
        let event_id = seeded_event(&app).await;
        for name in ["Primi", "Dolci"] {
            send(
                &app,
                "POST",
                &format!("/events/{}/categories", event_id),
                Some(json!({"name": name})),
            )
            .await;
        }
        send(
            &app,
            "POST",
            &format!("/events/{}/menu", event_id),
            Some(json!({"title": "Torta", "price": 3, "category_id": 2})),
        )
        .await;
        send(
            &app,
            "POST",
            &format!("/events/{}/menu", event_id),
            Some(json!({"title": "Pasta", "price": 5, "category_id": 1})),
        )
        .await;

        let (status, _) = send(
            &app,
            "POST",
            &format!("/events/{}/categories/reorder", event_id),
            Some(json!({"drag_index": 1, "hover_index": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, "GET", &format!("/events/{}/menu/grouped", event_id), None).await;
        let sections: Vec<Value> = data(body);
        let names: Vec<&str> = sections.iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Dolci", "Primi"]);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/events/{}/menu/reorder", event_id),
            Some(json!({"drag_index": 0, "hover_index": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bulk_delete_needs_confirmation() {
        let app = app();
        let event_id = seeded_event(&app).await;
        send(
            &app,
            "POST",
            &format!("/events/{}/categories", event_id),
            Some(json!({"name": "Primi"})),
        )
        .await;

        let uri = format!("/events/{}/categories", event_id);
        let (status, _) = send(&app, "DELETE", &uri, Some(json!({"ids": [1]}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "DELETE", &uri, Some(json!({"ids": [1], "confirm": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data::<Value>(body)["deleted"], 1);
    }

    #[tokio::test]
    async fn test_change_stream() {
        let app = app();
        let (status, _) = send(&app, "GET", "/events/7/changes", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let event_id = seeded_event(&app).await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/events/{}/changes", event_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
    }

    #[tokio::test]
    async fn test_unknown_events_are_not_cached() {
        let state = AppState::new(Arc::new(MemoryStore::new()));
        let app = create_routes(state.clone(), &test_config());

        for event_id in 1..=100 {
            let (status, _) = send(&app, "GET", &format!("/events/{}/menu", event_id), None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            let (status, _) = send(
                &app,
                "POST",
                &format!("/events/{}/orders", event_id),
                Some(json!({"customer_name": "Ada", "item_ids": [1]})),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        assert!(state.queries.is_empty());
    }

    #[tokio::test]
    async fn test_security_headers_are_set() {
        let app = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }
}
