//! Contracts for the tiers the orchestrator consults.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::geo::BoundingBox;

use super::HazardQuery;

/// Free-form query filters passed through to remote tiers (e.g. `days=2`).
pub type QueryFilters = BTreeMap<String, String>;

/// Failure of a single tier attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The tier did not answer within its budget.
    #[error("timeout")]
    Timeout,

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// 5xx response.
    #[error("server error: {status}")]
    Server { status: u16 },

    /// 429 response.
    #[error("rate limited")]
    RateLimited,

    /// Other non-success response.
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    /// Response body did not decode.
    #[error("parse error: {0}")]
    Parse(String),

    /// The tier is not usable (bad configuration, missing file).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Transient failures are expected to clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout | RemoteError::Transport(_) | RemoteError::Server { .. } | RemoteError::RateLimited)
    }
}

/// A remote data tier (one implementation per remote source).
#[async_trait::async_trait]
pub trait RemoteDataClient<T>: Send + Sync {
    /// Fetch data covering `bounds`. `timeout` is the tier's budget; the
    /// orchestrator enforces it independently.
    async fn fetch(&self, bounds: &BoundingBox, filters: &QueryFilters, timeout: Duration) -> Result<T, RemoteError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "remote"
    }
}

/// Produces clearly-labeled synthetic (demo) data.
pub trait SyntheticSource<T>: Send + Sync {
    fn generate(&self, query: &HazardQuery) -> Result<T, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout.is_transient());
        assert!(RemoteError::Transport("reset".into()).is_transient());
        assert!(RemoteError::Server { status: 503 }.is_transient());
        assert!(RemoteError::RateLimited.is_transient());
        assert!(!RemoteError::Http { status: 404 }.is_transient());
        assert!(!RemoteError::Parse("eof".into()).is_transient());
        assert!(!RemoteError::Unavailable("no file".into()).is_transient());
    }
}
