//! Pluggable networking.
//!
//! The crate never talks to the network itself; callers hand in a fetcher.

use std::future::Future;
use std::pin::Pin;

use crate::models::types::Result;

/// Fetch the raw body behind a URL.
///
/// Failures are reported as [`TransitError::Fetch`].
///
/// [`TransitError::Fetch`]: crate::models::types::TransitError::Fetch
pub trait DataFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        url: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;
}
