//! Cached data accessors ("hooks") kept fresh by the change feed.
//!
//! Each accessor returns a [`Query`] handle: read the cached state, force a
//! refetch with [`Query::mutate`], or write optimistically with
//! [`Query::set_data`]. A change on the backend that matches the query's
//! filter triggers a refetch on its own.

mod cache;
mod query;

pub use cache::QueryCache;
pub use query::{Query, QueryKey, QueryState};
