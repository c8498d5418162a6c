use std::time::Duration;

use tracing::{debug, warn};

use super::QueryKey;
use crate::error::QueryError;

/// Receives every execution and failure in the query graph.
pub trait QueryObserver: Send + Sync {
    fn on_execute(&self, label: &str, key: &QueryKey);
    fn on_success(&self, label: &str, key: &QueryKey, elapsed: Duration);
    fn on_failure(&self, label: &str, key: &QueryKey, error: &QueryError);
}

/// Reports query activity as `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl QueryObserver for TracingObserver {
    fn on_execute(&self, label: &str, key: &QueryKey) {
        debug!(label, key = %key, "executing query");
    }

    fn on_success(&self, label: &str, key: &QueryKey, elapsed: Duration) {
        debug!(
            label,
            key = %key,
            elapsed_ms = elapsed.as_millis() as u64,
            "query succeeded"
        );
    }

    fn on_failure(&self, label: &str, key: &QueryKey, error: &QueryError) {
        warn!(label, key = %key, error = %error, "query failed");
    }
}
