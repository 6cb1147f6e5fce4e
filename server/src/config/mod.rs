use std::env;
use std::net::SocketAddr;
use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

pub const DEFAULT_LOG_FILTER: &str = "catering_server=info,tower_http=info";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Without one the server keeps everything in memory.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub bind_addr: SocketAddr,
    pub change_feed_capacity: usize,
    pub allowed_origins: String,
    pub production: bool,
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let change_feed_capacity =
            parsed(&lookup, "CHANGE_FEED_CAPACITY", DEFAULT_CHANGE_FEED_CAPACITY)?;
        if change_feed_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "CHANGE_FEED_CAPACITY",
                value: "0".to_string(),
            });
        }
        let default_addr = DEFAULT_BIND_ADDR.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: DEFAULT_BIND_ADDR.to_string(),
        })?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            bind_addr: parsed(&lookup, "BIND_ADDR", default_addr)?,
            change_feed_capacity,
            allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: lookup("RUST_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        })
    }
}
