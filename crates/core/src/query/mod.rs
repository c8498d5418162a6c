//! The dependency query graph.

mod client;
mod graph;
mod key;
mod observer;
mod state;

pub use client::QueryClient;
pub use graph::{Dependencies, Query, QueryBuilder, QueryValue, UpstreamQuery};
pub use key::{KeyPart, QueryKey};
pub use observer::{QueryObserver, TracingObserver};
pub use state::QueryState;
