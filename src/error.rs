use std::sync::Arc;

use thiserror::Error;

/// Failure at the remote source boundary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not authorized to read appointments (status {0})")]
    Unauthorized(u16),

    #[error("appointments endpoint returned status {0}")]
    Status(u16),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(e) => e.is_timeout() || e.is_connect(),
            FetchError::Unauthorized(_) => false,
            FetchError::Status(code) => *code >= 500 || *code == 429,
        }
    }
}

/// Failure reported to callers of a refresh. The cached snapshot is untouched.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("could not refresh appointments, stale data retained: {0}")]
    Fetch(Arc<FetchError>),

    #[error("refresh task aborted: {0}")]
    Aborted(String),
}

impl From<FetchError> for RefreshError {
    fn from(e: FetchError) -> Self {
        RefreshError::Fetch(Arc::new(e))
    }
}
