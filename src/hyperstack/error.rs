//! Error types for the Hyperstack backend.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors raised by the Hyperstack backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HyperstackError {
    /// Raised when the client cannot be configured.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid request: {0}")]
    Validation(String),
    /// Raised when the request never produced an HTTP response.
    #[error("request to {endpoint} failed: {message}")]
    Transport {
        /// Method and path of the request.
        endpoint: String,
        /// Message returned by the HTTP client.
        message: String,
    },
    /// Raised when the API answers with an unexpected HTTP status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Http {
        /// Method and path of the request.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// Raised when the response envelope reports failure.
    #[error("{endpoint} reported failure: {message}")]
    Api {
        /// Method and path of the request.
        endpoint: String,
        /// Message carried by the envelope.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("could not decode response from {endpoint}: {message}")]
    Decode {
        /// Method and path of the request.
        endpoint: String,
        /// Parser message.
        message: String,
    },
    /// Raised when instance creation succeeds without returning an instance.
    #[error("instance creation for {name} returned no instances")]
    MissingInstance {
        /// Name of the requested instance.
        name: String,
    },
}

impl From<BackendError> for HyperstackError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}
