//! Error taxonomy for the redaction core.
//!
//! Only [`ExtractionError`], [`RemoteError`] and [`RenderError`] can end a job
//! in the error state. Degenerate rewrite output is not an error at all: the
//! pipeline falls back to the input chunk and logs a warning.

use thiserror::Error;

use crate::jobs::QueueState;

/// Failure reported by a rewriting provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The service is throttling requests. Retried with backoff.
    #[error("rate limited: {message}")]
    RateLimited { message: String },
    /// Any other failure. Never retried.
    #[error("{message}")]
    Service {
        status: Option<u16>,
        message: String,
    },
}

impl RemoteError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Service { status, .. } => *status,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        if status == Some(429) {
            return Self::rate_limited(err.to_string());
        }
        Self::Service {
            status,
            message: err.to_string(),
        }
    }
}

/// The source document could not be turned into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("document is unreadable: {0}")]
    Unreadable(String),
    #[error("document contains no text")]
    Empty,
}

/// The redacted text could not be rendered into an output document.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("failed to write document: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejected queue operation. The queue is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue limit reached: {current} queued + {requested} new exceeds the maximum of {capacity} documents")]
    Capacity {
        current: usize,
        requested: usize,
        capacity: usize,
    },
    #[error("queue is {state}; stop it and wait for the current document to finish first")]
    State { state: QueueState },
}

/// Why a single job ended in the error state.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_reports_429() {
        let err = RemoteError::rate_limited("slow down");
        assert!(err.is_rate_limited());
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.to_string(), "rate limited: slow down");
    }

    #[test]
    fn test_job_error_keeps_underlying_message() {
        let err: JobError = RemoteError::service("model not found").into();
        assert_eq!(err.to_string(), "model not found");

        let err: JobError = ExtractionError::Empty.into();
        assert_eq!(err.to_string(), "document contains no text");
    }

    #[test]
    fn test_queue_state_error_names_state() {
        let err = QueueError::State {
            state: QueueState::Running,
        };
        assert!(err.to_string().contains("running"));
    }
}
