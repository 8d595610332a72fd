//! Error types for the TestMonitor client.
//!
//! # Design
//! `NotFound` gets a dedicated variant because single-item get/delete callers
//! routinely distinguish "the result does not exist" from every other failure.
//! 400 responses are the service rejecting the request (malformed filter,
//! bad field) and land in `Validation` with the decoded error descriptor.
//! Bulk partial failures are never errors: they are returned as data inside
//! `PartialSuccess`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::ServiceError;

/// Errors returned by `TestMonitorClient` and `Session`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server returned 404: the requested result does not exist.
    #[error("resource not found")]
    NotFound { error: Option<ServiceError> },

    /// The server rejected the request as invalid (HTTP 400).
    #[error("request rejected by the service (HTTP {status}){}", describe(.error))]
    Validation {
        status: u16,
        error: Option<ServiceError>,
    },

    /// The server returned an unexpected status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The transport could not complete the round trip.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    /// The service error descriptor carried by the response, if any.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            ApiError::NotFound { error } | ApiError::Validation { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }
}

fn describe(error: &Option<ServiceError>) -> String {
    match error.as_ref().and_then(|e| e.message.as_deref()) {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}
