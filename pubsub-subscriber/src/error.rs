//! Error types for the pubsub-subscriber crate.

use hub_client::TransportError;
use std::time::Duration;

use crate::types::{SubscriptionId, SubscriptionState};

/// Malformed caller input. Always raised before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A URL is missing, relative, or not http(s)
    #[error("Invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        /// Which URL: "topic", "hub" or "callback"
        field: &'static str,
        value: String,
        reason: String,
    },

    /// A required URL was never set
    #[error("Missing {0} URL")]
    MissingUrl(&'static str),

    /// No hub URL registered
    #[error("No hub URLs registered")]
    NoHubs,

    /// Subscribe requested with a zero lease
    #[error("Lease seconds must be greater than 0")]
    InvalidLeaseSeconds,

    /// A request would carry an empty verify token
    #[error("Verify token must not be empty")]
    EmptyVerifyToken,

    /// No `hub.verify` mode configured
    #[error("At least one verification mode is required")]
    NoVerifyModes,

    /// Publish requested with nothing to publish
    #[error("No updated topic URLs registered")]
    NoTopics,
}

/// Failures of a [`crate::SubscriptionStore`] backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem error
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be (de)serialized
    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Failure of one hub within a batch operation.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// The hub URL or request parameters were invalid
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The request never got a response
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The hub answered with a non-2xx status
    #[error("Hub rejected request with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// No response within the configured timeout
    #[error("Hub did not respond within {0:?}")]
    Timeout(Duration),

    /// Cancelled by the caller before completion
    #[error("Cancelled")]
    Cancelled,

    /// The subscription record could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Reasons a hub verification callback is refused.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// No record matches the subscription id
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// The presented `hub.verify_token` differs from the stored one
    #[error("Verify token mismatch for subscription {0}")]
    TokenMismatch(SubscriptionId),

    /// The presented `hub.topic` differs from the stored one
    #[error("Topic mismatch for subscription {id}: expected {expected}, got {actual}")]
    TopicMismatch {
        id: SubscriptionId,
        expected: String,
        actual: String,
    },

    /// `hub.mode` does not match the pending action of the record
    #[error("Mode '{mode}' does not apply to subscription {id} in state {state}")]
    ModeMismatch {
        id: SubscriptionId,
        mode: String,
        state: SubscriptionState,
    },

    /// A required verification parameter is missing
    #[error("Missing verification parameter: {0}")]
    MissingParameter(&'static str),

    /// The record could not be read or written
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors that abort a whole operation.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    /// Caller input is invalid; nothing was sent
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage failed outside of a per-hub operation
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using SubscriberError.
pub type Result<T> = std::result::Result<T, SubscriberError>;
