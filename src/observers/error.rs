//! Unified error type for all observers.
//!
//! Every observer reports failures through [`ObserverError`], so switching
//! output formats never changes error handling.

use thiserror::Error;

use crate::error::CounterError;

/// Unified error type for all observer operations.
#[derive(Debug, Error)]
pub enum ObserverError {
    /// Error from the JSON observer.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error encoding to UTF-8.
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The counter could not be read.
    #[error("counter error: {0}")]
    Counter(#[from] CounterError),
}

/// Result type for observer operations.
pub type Result<T> = std::result::Result<T, ObserverError>;
