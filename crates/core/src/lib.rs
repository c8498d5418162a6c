//! # ridealong-core
//!
//! The async data layer: a dependency-ordered query graph over the transit
//! sources, per-source dispatch, and the feed queries that tie the pure
//! adapters in [`transit`] to a [`DataFetcher`](transit::DataFetcher).

pub mod config;
pub mod error;
pub mod feeds;
pub mod query;
pub mod selector;

// Re-export transit from the transit crate
pub use ridealong_transit as transit;

pub use config::{ConfigError, FeedConfig};
pub use error::QueryError;
pub use feeds::TransitFeeds;
pub use query::{Query, QueryBuilder, QueryClient, QueryKey, QueryObserver, QueryState};
pub use selector::{SourceSelector, SourceTable};
