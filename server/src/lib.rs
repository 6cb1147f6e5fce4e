pub mod config;
pub mod events;
pub mod handlers;
pub mod menu;
pub mod models;
pub mod orders;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod utils;

pub use state::AppState;
