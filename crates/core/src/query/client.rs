use std::sync::Arc;

use dashmap::DashMap;
use tracing::warn;

use super::graph::ErasedQuery;
use super::{Query, QueryBuilder, QueryKey, QueryObserver, QueryValue, TracingObserver};

/// Registry of queries keyed by declared key.
///
/// Asking for a key twice hands back the same query, so every consumer of
/// a key shares one cache and one in-flight execution.
pub struct QueryClient {
    observer: Arc<dyn QueryObserver>,
    registry: DashMap<QueryKey, Arc<dyn ErasedQuery>>,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::with_observer(Arc::new(TracingObserver))
    }
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn QueryObserver>) -> Self {
        Self {
            observer,
            registry: DashMap::new(),
        }
    }

    /// A builder reporting to this client's observer.
    pub fn builder<T: QueryValue>(&self, label: impl Into<Arc<str>>, key: QueryKey) -> QueryBuilder<T> {
        QueryBuilder::new(label, key).observer(self.observer.clone())
    }

    /// The registered query for `key`, or the one `declare` builds.
    ///
    /// `declare` may itself register upstream queries.
    pub fn query<T, F>(&self, label: &str, key: QueryKey, declare: F) -> Query<T>
    where
        T: QueryValue,
        F: FnOnce(QueryBuilder<T>) -> Query<T>,
    {
        let existing = self.registry.get(&key).map(|entry| entry.value().clone());
        if let Some(query) = existing.and_then(Query::from_erased) {
            return query;
        }

        let built = declare(self.builder(label, key.clone()));
        let stored = self
            .registry
            .entry(key.clone())
            .or_insert_with(|| built.erased())
            .value()
            .clone();

        Query::from_erased(stored).unwrap_or_else(|| {
            warn!(label, key = %key, "query key registered with another value type");
            built
        })
    }

    /// Invalidate every registered query whose declared key starts with
    /// `prefix`. Returns how many were invalidated.
    pub fn invalidate_prefix(&self, prefix: &QueryKey) -> usize {
        let matching: Vec<Arc<dyn ErasedQuery>> = self
            .registry
            .iter()
            .filter(|entry| entry.key().parts().starts_with(prefix.parts()))
            .map(|entry| entry.value().clone())
            .collect();

        for query in &matching {
            query.invalidate();
        }
        matching.len()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
