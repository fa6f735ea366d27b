//! Error types for the code.json exporter.
//!
//! Library crates use [`CodeJsonError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all exporter operations.
#[derive(Debug, thiserror::Error)]
pub enum CodeJsonError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A page read against one of the source collections failed.
    ///
    /// Fatal to an export: joins need both collections complete.
    #[error("{collection} error, unable to read items: {message}")]
    CollectionRead { collection: String, message: String },

    /// Create/update/delete against the append collection failed.
    #[error("AppendData error, unable to {operation} item: {message}")]
    Write { operation: String, message: String },

    /// Network/HTTP error outside of a collection read.
    #[error("network error: {0}")]
    Network(String),

    /// Repository metadata lookup failed or returned nothing usable.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Response or payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad record, invalid input file, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CodeJsonError>;

impl CodeJsonError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a collection read error for the named collection.
    pub fn collection_read(collection: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::CollectionRead {
            collection: collection.into(),
            message: msg.into(),
        }
    }

    /// Create a write error for a create/update/delete operation.
    pub fn write(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Write {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CodeJsonError::config("missing list id");
        assert_eq!(err.to_string(), "config error: missing list id");

        let err = CodeJsonError::collection_read("ImportData", "HTTP 500");
        assert_eq!(
            err.to_string(),
            "ImportData error, unable to read items: HTTP 500"
        );

        let err = CodeJsonError::write("update", "HTTP 412");
        assert_eq!(
            err.to_string(),
            "AppendData error, unable to update item: HTTP 412"
        );
    }
}
