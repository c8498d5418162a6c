//! Per-source dispatch.
//!
//! A [`SourceSelector`] picks the query registered for an entity's source
//! tag. A tag without a registered query resolves successfully to the
//! caller's default: that is how a source reports it lacks a capability.

use std::collections::HashMap;
use std::sync::Arc;

use ridealong_transit::SourceTag;
use strum::IntoEnumIterator;

use crate::query::{Query, QueryState, QueryValue};

/// Source tag to per-source query.
pub struct SourceTable<T> {
    queries: HashMap<SourceTag, Query<T>>,
}

impl<T: QueryValue> SourceTable<T> {
    /// Ask `declare` once per source tag; `None` means unsupported.
    ///
    /// Write `declare` as an exhaustive `match` so a new source cannot be
    /// added without deciding its entry.
    pub fn from_fn(mut declare: impl FnMut(SourceTag) -> Option<Query<T>>) -> Self {
        Self {
            queries: SourceTag::iter()
                .filter_map(|tag| declare(tag).map(|query| (tag, query)))
                .collect(),
        }
    }

    pub fn get(&self, tag: SourceTag) -> Option<&Query<T>> {
        self.queries.get(&tag)
    }

    pub fn supports(&self, tag: SourceTag) -> bool {
        self.queries.contains_key(&tag)
    }
}

pub struct SourceSelector<T> {
    source: Option<SourceTag>,
    table: SourceTable<T>,
    default: Arc<T>,
}

impl<T: QueryValue> SourceSelector<T> {
    pub fn new(source: Option<SourceTag>, table: SourceTable<T>, default: T) -> Self {
        Self {
            source,
            table,
            default: Arc::new(default),
        }
    }

    /// Enabled only once the source tag is known.
    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// The query that would serve this selector, if any.
    pub fn selected(&self) -> Option<&Query<T>> {
        self.table.get(self.source?)
    }

    pub async fn resolve(&self) -> QueryState<T> {
        match self.source {
            None => QueryState::Idle,
            Some(tag) => match self.table.get(tag) {
                Some(query) => query.resolve().await,
                None => QueryState::Success(self.default.clone()),
            },
        }
    }

    /// Current state without executing anything.
    pub fn state(&self) -> QueryState<T> {
        match self.source {
            None => QueryState::Idle,
            Some(tag) => match self.table.get(tag) {
                Some(query) => query.state(),
                None => QueryState::Success(self.default.clone()),
            },
        }
    }
}
