use axum::Router;
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use catering_server::config::{Config, DEFAULT_LOG_FILTER};
use catering_server::routes::create_routes;
use catering_server::store::{MemoryStore, PgStore, SharedClient};
use catering_server::AppState;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let client: SharedClient = match &config.database_url {
        Some(database_url) => {
            let store = PgStore::connect(
                database_url,
                config.max_connections,
                config.change_feed_capacity,
            )
            .await
            .expect("Failed to connect to database");
            tracing::info!("Successfully connected to database");

            store.migrate().await.expect("Failed to run migrations");
            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping data in memory");
            Arc::new(MemoryStore::with_capacity(config.change_feed_capacity))
        }
    };

    let app: Router = create_routes(AppState::new(client), &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
