//! Transit data models and types.

pub mod types;

pub use types::{Result, TransitError};
