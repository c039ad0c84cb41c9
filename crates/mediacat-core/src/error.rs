use std::io;

use thiserror::Error;

/// Failure reported by a storage backend.
///
/// Only [`BackendError::Unavailable`] is fatal to a crawl; an I/O error is
/// scoped to the single entry that produced it.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} is unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl BackendError {
    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Errors that abort a whole crawl.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("storage backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("crawl cancelled")]
    Cancelled,

    #[error(transparent)]
    Backend(BackendError),
}

impl From<BackendError> for CrawlError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { backend, reason } => {
                Self::BackendUnavailable { backend, reason }
            }
            other => Self::Backend(other),
        }
    }
}

/// Split a backend error into "abort the crawl" and "handle locally".
///
/// Returns `Err` for unavailability so callers can `?` it, and hands every
/// other error back for a local decision.
pub(crate) fn escalate(err: BackendError) -> Result<BackendError, CrawlError> {
    if err.is_unavailable() {
        Err(err.into())
    } else {
        Ok(err)
    }
}
