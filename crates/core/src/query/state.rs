use std::sync::Arc;

use crate::error::QueryError;

/// Observable state of a query.
#[derive(Debug)]
pub enum QueryState<T> {
    /// Disabled, or waiting on a disabled upstream.
    Idle,
    /// No settled outcome yet.
    Pending,
    Success(Arc<T>),
    Error(QueryError),
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        match self {
            QueryState::Idle => QueryState::Idle,
            QueryState::Pending => QueryState::Pending,
            QueryState::Success(value) => QueryState::Success(value.clone()),
            QueryState::Error(error) => QueryState::Error(error.clone()),
        }
    }
}

impl<T: PartialEq> PartialEq for QueryState<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QueryState::Idle, QueryState::Idle) => true,
            (QueryState::Pending, QueryState::Pending) => true,
            (QueryState::Success(a), QueryState::Success(b)) => a == b,
            (QueryState::Error(a), QueryState::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryState::Success(_))
    }

    pub fn data(&self) -> Option<&Arc<T>> {
        match self {
            QueryState::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            QueryState::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Transform a successful value, keeping every other state.
    pub fn map<U>(self, f: impl FnOnce(&T) -> U) -> QueryState<U> {
        match self {
            QueryState::Idle => QueryState::Idle,
            QueryState::Pending => QueryState::Pending,
            QueryState::Success(value) => QueryState::Success(Arc::new(f(&value))),
            QueryState::Error(error) => QueryState::Error(error),
        }
    }

    /// `Err` for error states, `Ok(None)` while idle or pending.
    pub fn into_result(self) -> Result<Option<Arc<T>>, QueryError> {
        match self {
            QueryState::Success(value) => Ok(Some(value)),
            QueryState::Error(error) => Err(error),
            QueryState::Idle | QueryState::Pending => Ok(None),
        }
    }
}
