//! Core types for the subscriber.
//!
//! The subscription record, its lifecycle state, the protocol modes, and
//! the deterministic subscription identifier.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

/// Persisted value of [`SubscriptionState::NotVerified`]
pub const SUBSCRIPTION_NOTVERIFIED: &str = "not_verified";
/// Persisted value of [`SubscriptionState::Verified`]
pub const SUBSCRIPTION_VERIFIED: &str = "verified";
/// Persisted value of [`SubscriptionState::ToDelete`]
pub const SUBSCRIPTION_TODELETE: &str = "to_delete";

/// Default lease requested from hubs: 30 days.
pub const DEFAULT_LEASE_SECONDS: u64 = 2_592_000;

/// Deterministic identifier of a (hub, topic, callback) relationship.
///
/// Lowercase hex SHA-1 of the hub URL, topic URL and callback base URL
/// concatenated in that order. Recomputing it for the same triple always
/// yields the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Derive the id of a hub/topic/callback triple.
    pub fn derive(hub_url: &str, topic_url: &str, callback_url: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(hub_url.as_bytes());
        hasher.update(topic_url.as_bytes());
        hasher.update(callback_url.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wrap an id received from outside, e.g. a callback query parameter.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubscriptionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of a subscription record.
///
/// ```text
/// NotVerified --(subscribe verified)--> Verified
/// Verified --(unsubscribe requested)--> ToDelete
/// ToDelete --(unsubscribe verified)--> (record removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionState {
    #[serde(rename = "not_verified")]
    NotVerified,
    #[serde(rename = "verified")]
    Verified,
    #[serde(rename = "to_delete")]
    ToDelete,
}

impl SubscriptionState {
    /// The value persisted in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::NotVerified => SUBSCRIPTION_NOTVERIFIED,
            SubscriptionState::Verified => SUBSCRIPTION_VERIFIED,
            SubscriptionState::ToDelete => SUBSCRIPTION_TODELETE,
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            SUBSCRIPTION_NOTVERIFIED => Ok(SubscriptionState::NotVerified),
            SUBSCRIPTION_VERIFIED => Ok(SubscriptionState::Verified),
            SUBSCRIPTION_TODELETE => Ok(SubscriptionState::ToDelete),
            other => Err(format!("unknown subscription state: {other}")),
        }
    }
}

/// `hub.mode` values sent to hubs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMode {
    Subscribe,
    Unsubscribe,
    Publish,
}

impl HubMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HubMode::Subscribe => "subscribe",
            HubMode::Unsubscribe => "unsubscribe",
            HubMode::Publish => "publish",
        }
    }
}

impl fmt::Display for HubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `hub.verify` values: how the hub may confirm the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyMode {
    Sync,
    Async,
}

impl VerifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyMode::Sync => "sync",
            VerifyMode::Async => "async",
        }
    }
}

/// One topic/hub/callback relationship as persisted by a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub topic_url: String,
    pub hub_url: String,
    /// Callback base URL, before the subscription id is appended
    pub callback_url: String,
    pub verify_token: String,
    pub lease_seconds: u64,
    pub subscription_state: SubscriptionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the hub verifies the subscription
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Create a fresh, unverified record for a triple.
    pub fn new(
        hub_url: impl Into<String>,
        topic_url: impl Into<String>,
        callback_url: impl Into<String>,
        verify_token: impl Into<String>,
        lease_seconds: u64,
    ) -> Self {
        let hub_url = hub_url.into();
        let topic_url = topic_url.into();
        let callback_url = callback_url.into();
        let now = Utc::now();

        Self {
            id: SubscriptionId::derive(&hub_url, &topic_url, &callback_url),
            topic_url,
            hub_url,
            callback_url,
            verify_token: verify_token.into(),
            lease_seconds,
            subscription_state: SubscriptionState::NotVerified,
            created_at: now,
            updated_at: now,
            expires_at: None,
        }
    }

    /// Move to `state`, stamping `updated_at`.
    pub fn transition(&mut self, state: SubscriptionState) {
        self.subscription_state = state;
        self.updated_at = Utc::now();
    }

    /// Mark verified by the hub with the granted lease.
    pub fn mark_verified(&mut self, lease_seconds: u64) {
        let now = Utc::now();
        self.lease_seconds = lease_seconds;
        self.expires_at = i64::try_from(lease_seconds)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|lease| now.checked_add_signed(lease));
        self.transition(SubscriptionState::Verified);
    }

    pub fn is_verified(&self) -> bool {
        self.subscription_state == SubscriptionState::Verified
    }

    /// Time left before the lease runs out, `None` if never verified.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.expires_at.map(|expires_at| expires_at - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_id_is_deterministic() {
        let a = SubscriptionId::derive(
            "http://hub.example.com/",
            "http://www.example.com/topic",
            "http://www.example.com/callback",
        );
        let b = SubscriptionId::derive(
            "http://hub.example.com/",
            "http://www.example.com/topic",
            "http://www.example.com/callback",
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 40);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_subscription_id_depends_on_every_part() {
        let base = SubscriptionId::derive("h", "t", "c");
        assert_ne!(base, SubscriptionId::derive("h2", "t", "c"));
        assert_ne!(base, SubscriptionId::derive("h", "t2", "c"));
        assert_ne!(base, SubscriptionId::derive("h", "t", "c2"));
    }

    #[test]
    fn test_subscription_id_known_value() {
        // sha1("abc")
        assert_eq!(
            SubscriptionId::derive("a", "b", "c").as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_state_persisted_values() {
        assert_eq!(SubscriptionState::NotVerified.as_str(), "not_verified");
        assert_eq!(SubscriptionState::Verified.as_str(), "verified");
        assert_eq!(SubscriptionState::ToDelete.as_str(), "to_delete");

        assert_eq!(
            serde_json::to_string(&SubscriptionState::ToDelete).unwrap(),
            "\"to_delete\""
        );
        assert_eq!(
            "verified".parse::<SubscriptionState>().unwrap(),
            SubscriptionState::Verified
        );
        assert!("pending".parse::<SubscriptionState>().is_err());
    }

    #[test]
    fn test_new_subscription_is_not_verified() {
        let sub = Subscription::new(
            "http://hub.example.com/",
            "http://www.example.com/topic",
            "http://www.example.com/callback",
            "abc",
            DEFAULT_LEASE_SECONDS,
        );
        assert_eq!(sub.subscription_state, SubscriptionState::NotVerified);
        assert_eq!(
            sub.id,
            SubscriptionId::derive(
                "http://hub.example.com/",
                "http://www.example.com/topic",
                "http://www.example.com/callback"
            )
        );
        assert!(sub.expires_at.is_none());
        assert!(sub.time_until_expiry(Utc::now()).is_none());
    }

    #[test]
    fn test_mark_verified_sets_expiry() {
        let mut sub = Subscription::new("h", "t", "c", "abc", DEFAULT_LEASE_SECONDS);
        sub.mark_verified(3600);

        assert!(sub.is_verified());
        assert_eq!(sub.lease_seconds, 3600);
        let remaining = sub.time_until_expiry(Utc::now()).unwrap();
        assert!(remaining <= ChronoDuration::seconds(3600));
        assert!(remaining > ChronoDuration::seconds(3500));
    }

    #[test]
    fn test_subscription_json_shape() {
        let sub = Subscription::new("h", "t", "c", "abc", 10);
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["subscription_state"], "not_verified");
        assert_eq!(json["id"], sub.id.as_str());

        let back: Subscription = serde_json::from_value(json).unwrap();
        assert_eq!(back, sub);
    }

    #[test]
    fn test_modes() {
        assert_eq!(HubMode::Subscribe.as_str(), "subscribe");
        assert_eq!(HubMode::Unsubscribe.to_string(), "unsubscribe");
        assert_eq!(HubMode::Publish.as_str(), "publish");
        assert_eq!(VerifyMode::Sync.as_str(), "sync");
        assert_eq!(VerifyMode::Async.as_str(), "async");
    }
}
