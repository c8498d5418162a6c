use std::sync::Arc;

use ridealong_transit::TransitError;

/// Why a query has no value.
///
/// Outcomes are shared between every caller awaiting the same execution, so
/// the error is cheap to clone.
#[derive(Clone, Debug, thiserror::Error)]
pub enum QueryError {
    /// The fetcher failed; terminal for this attempt.
    #[error("transport failure: {0}")]
    Transport(Arc<str>),

    /// A payload did not decode into its source's schema.
    #[error("invalid {label} payload: {message}")]
    Validation { label: Arc<str>, message: Arc<str> },

    /// A derivation could not resolve a join.
    #[error("{0}")]
    Adapter(Arc<TransitError>),

    /// A derivation read a query it never declared as upstream.
    #[error("query read undeclared dependency {0:?}")]
    UndeclaredDependency(Arc<str>),
}

impl From<TransitError> for QueryError {
    fn from(error: TransitError) -> Self {
        match error {
            TransitError::Fetch { url, message } => {
                QueryError::Transport(format!("{url}: {message}").into())
            }
            other => QueryError::Adapter(Arc::new(other)),
        }
    }
}

impl PartialEq for QueryError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (QueryError::Adapter(a), QueryError::Adapter(b)) => {
                Arc::ptr_eq(a, b) || a.to_string() == b.to_string()
            }
            (QueryError::Transport(a), QueryError::Transport(b)) => a == b,
            (
                QueryError::Validation { label: la, message: ma },
                QueryError::Validation { label: lb, message: mb },
            ) => la == lb && ma == mb,
            (QueryError::UndeclaredDependency(a), QueryError::UndeclaredDependency(b)) => a == b,
            _ => false,
        }
    }
}
