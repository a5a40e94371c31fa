/*!
# Error Handling

Error types for the windowing middleware. All configuration, rewriting and
ingest operations return well-structured errors with enough context to tell
the operator which stream source failed and why.

## Error Categories

- **Configuration Errors**: malformed or missing window-size/slide strings,
  detected at `validate()` time before a source is ever attached
- **Storage Errors**: failures creating tables/views or writing tuples,
  propagated to the immediate caller and never silently retried
- **Rewrite Errors**: an alias that cannot be resolved to a physical name;
  always a defect, never a recoverable condition

## Error Propagation

The module provides the `SluiceResult<T>` alias for fallible operations.
Storage-layer failures carry their own [`StorageError`](crate::sluice::storage::StorageError)
and convert into [`SluiceError::Storage`] via `From`.
*/

use crate::sluice::storage::StorageError;
use std::fmt;

/// Errors raised by the windowing middleware.
///
/// Each variant carries context specific to the failure: the offending
/// configuration parameter, the statement that failed against storage, or
/// the alias/query pair that could not be rewritten.
#[derive(Debug, Clone)]
pub enum SluiceError {
    /// Malformed or missing window specification strings.
    ///
    /// Surfaced synchronously from `StreamSource::validate()`; a source that
    /// fails validation is never attached to a running configuration.
    Configuration {
        /// Human-readable description of the problem
        message: String,
        /// The configuration parameter that caused it, if known
        parameter: Option<String>,
    },

    /// A failure in the storage backend while creating the view, writing a
    /// tuple, or reading window state.
    Storage {
        /// Description of the storage failure
        message: String,
        /// The statement that failed, if available
        statement: Option<String>,
    },

    /// An alias that could not be fully resolved during query rewriting.
    ///
    /// A rewritten query must never contain the original alias; this is a
    /// defect in the configuration or rewriter, not a runtime condition.
    Rewrite {
        /// The alias token that remained unresolved
        alias: String,
        /// The query being rewritten
        query: String,
    },
}

impl fmt::Display for SluiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SluiceError::Configuration { message, parameter } => {
                if let Some(param) = parameter {
                    write!(f, "Configuration error for '{}': {}", param, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
            SluiceError::Storage { message, statement } => {
                if let Some(stmt) = statement {
                    write!(f, "Storage error in '{}': {}", stmt, message)
                } else {
                    write!(f, "Storage error: {}", message)
                }
            }
            SluiceError::Rewrite { alias, query } => {
                write!(f, "Rewrite error: alias '{}' unresolved in '{}'", alias, query)
            }
        }
    }
}

impl std::error::Error for SluiceError {}

impl SluiceError {
    /// Create a configuration error with an optional parameter name
    pub fn configuration(message: impl Into<String>, parameter: Option<String>) -> Self {
        SluiceError::Configuration {
            message: message.into(),
            parameter,
        }
    }

    /// Create a storage error with an optional offending statement
    pub fn storage(message: impl Into<String>, statement: Option<String>) -> Self {
        SluiceError::Storage {
            message: message.into(),
            statement,
        }
    }

    /// Create a rewrite error for an unresolved alias
    pub fn rewrite(alias: impl Into<String>, query: impl Into<String>) -> Self {
        SluiceError::Rewrite {
            alias: alias.into(),
            query: query.into(),
        }
    }
}

impl From<StorageError> for SluiceError {
    fn from(err: StorageError) -> Self {
        SluiceError::Storage {
            message: err.to_string(),
            statement: err.statement().map(|s| s.to_string()),
        }
    }
}

/// Result type for windowing operations
pub type SluiceResult<T> = Result<T, SluiceError>;
