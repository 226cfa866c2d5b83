//! Error types for the hub client

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while exchanging a request with a hub
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network or HTTP communication error
    #[error("Network/HTTP error: {0}")]
    Network(String),

    /// The hub did not answer within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built (bad URL, bad header value)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The underlying HTTP client could not be configured
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}
