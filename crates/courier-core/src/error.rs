// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier delivery subsystem.

use std::time::Duration;

use thiserror::Error;

/// The primary error type returned by stores, writers and workers.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid values, missing required settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Input rejected before anything was persisted.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A status change that the record state machine does not allow.
    #[error("illegal status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The referenced record does not exist.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Wrap any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }
}

/// Outcome of a failed hand-off to a dispatch sink or an inbox action.
///
/// Transient failures and timeouts are retried up to the configured limit.
/// Permanent failures mark the record as a poison message and discard it.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transient delivery failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("permanent delivery failure: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("delivery timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl DeliveryError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
        }
    }

    /// Transient failure caused by `source`.
    pub fn transient_from(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Permanent failure caused by `source`.
    pub fn permanent_from(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Permanent {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether retrying can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_field() {
        let err = CourierError::validation("destination", "must not be empty");
        assert_eq!(err.to_string(), "invalid destination: must not be empty");
    }

    #[test]
    fn only_permanent_delivery_errors_are_permanent() {
        assert!(DeliveryError::permanent("bad payload").is_permanent());
        assert!(!DeliveryError::transient("broker down").is_permanent());
        assert!(
            !DeliveryError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_permanent()
        );
    }

    #[test]
    fn delivery_error_keeps_source() {
        let err = DeliveryError::transient_from("connect failed", std::io::Error::other("refused"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("refused"));
    }
}
