//! Configuration types for the pubsub-subscriber crate
//!
//! This module defines the settings that control how requests are built,
//! how long the engine waits on hubs, and how tokens are handled on
//! unsubscribe.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SubscriberError;
use crate::types::{VerifyMode, DEFAULT_LEASE_SECONDS};

/// Where the subscription id goes in the callback URL sent to hubs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackStyle {
    /// `callback?xhub.subscription=<id>`
    #[default]
    QueryParameter,
    /// `callback/<id>`, for hubs that drop query strings
    PathSegment,
}

/// Which token an unsubscribe request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsubscribeTokenPolicy {
    /// Mint a fresh token for every unsubscribe request
    #[default]
    Regenerate,
    /// Resend the token stored with the subscription (fresh one if none)
    Reuse,
}

/// Configuration for the SubscriberEngine and Publisher
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Lease requested on subscribe
    /// Default: 2,592,000 seconds (30 days)
    pub lease_seconds: u64,

    /// `hub.verify` values, in the order they are sent
    /// Default: [sync, async]
    pub verify_modes: Vec<VerifyMode>,

    /// How the subscription id is attached to the callback URL
    /// Default: query parameter
    pub callback_style: CallbackStyle,

    /// Token policy for unsubscribe requests
    /// Default: regenerate
    pub unsubscribe_token: UnsubscribeTokenPolicy,

    /// Time allowed for one hub to answer
    /// Default: 10 seconds
    pub hub_timeout: Duration,

    /// Maximum number of hubs contacted at once
    /// Default: 8
    pub max_concurrent_hubs: usize,

    /// Extra form parameters sent with subscribe/unsubscribe requests
    /// Default: none
    pub parameters: BTreeMap<String, String>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            lease_seconds: DEFAULT_LEASE_SECONDS,
            verify_modes: vec![VerifyMode::Sync, VerifyMode::Async],
            callback_style: CallbackStyle::QueryParameter,
            unsubscribe_token: UnsubscribeTokenPolicy::Regenerate,
            hub_timeout: Duration::from_secs(10),
            max_concurrent_hubs: 8,
            parameters: BTreeMap::new(),
        }
    }
}

impl SubscriberConfig {
    /// Create a new SubscriberConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Short timeouts, for interactive callers that prefer failing fast
    pub fn fast_fail() -> Self {
        Self {
            hub_timeout: Duration::from_secs(3),
            ..Default::default()
        }
    }

    /// One hub at a time with generous timeouts
    pub fn conservative() -> Self {
        Self {
            hub_timeout: Duration::from_secs(30),
            max_concurrent_hubs: 1,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SubscriberError> {
        if self.lease_seconds == 0 {
            return Err(SubscriberError::Configuration(
                "Lease seconds must be greater than 0".to_string(),
            ));
        }

        if self.verify_modes.is_empty() {
            return Err(SubscriberError::Configuration(
                "At least one verification mode is required".to_string(),
            ));
        }

        if self.hub_timeout == Duration::ZERO {
            return Err(SubscriberError::Configuration(
                "Hub timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_hubs == 0 {
            return Err(SubscriberError::Configuration(
                "Max concurrent hubs must be greater than 0".to_string(),
            ));
        }

        if let Some(key) = self.parameters.keys().find(|key| key.starts_with("hub.")) {
            return Err(SubscriberError::Configuration(format!(
                "Custom parameter '{key}' collides with the hub.* protocol namespace"
            )));
        }

        Ok(())
    }

    /// Builder pattern methods for fluent configuration

    pub fn with_lease_seconds(mut self, lease_seconds: u64) -> Self {
        self.lease_seconds = lease_seconds;
        self
    }

    pub fn with_verify_modes(mut self, modes: Vec<VerifyMode>) -> Self {
        self.verify_modes = modes;
        self
    }

    pub fn with_callback_style(mut self, style: CallbackStyle) -> Self {
        self.callback_style = style;
        self
    }

    pub fn with_unsubscribe_token(mut self, policy: UnsubscribeTokenPolicy) -> Self {
        self.unsubscribe_token = policy;
        self
    }

    pub fn with_hub_timeout(mut self, timeout: Duration) -> Self {
        self.hub_timeout = timeout;
        self
    }

    pub fn with_max_concurrent_hubs(mut self, max: usize) -> Self {
        self.max_concurrent_hubs = max;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}
