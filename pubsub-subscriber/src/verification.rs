//! Hub intent verification.
//!
//! A hub confirms every subscribe and unsubscribe request by calling the
//! callback URL with a challenge. [`VerificationHandler`] checks those
//! calls against the stored record and applies the state transition.

use async_trait::async_trait;
use callback_server::{CallbackHandler, VerificationQuery, VerificationReply};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::VerificationError;
use crate::locks::RecordLocks;
use crate::store::SubscriptionStore;
use crate::types::{HubMode, SubscriptionId, SubscriptionState};

/// Validates hub verification callbacks against stored subscriptions.
#[derive(Clone)]
pub struct VerificationHandler {
    store: Arc<dyn SubscriptionStore>,
    locks: RecordLocks,
}

impl VerificationHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, locks: RecordLocks) -> Self {
        Self { store, locks }
    }

    /// Check a verification request and return the challenge to echo.
    ///
    /// `subscribe` is accepted for `NotVerified` and `Verified` records (a
    /// renewal re-verifies a live subscription) and marks the record
    /// verified with the granted lease. `unsubscribe` is accepted for
    /// `ToDelete` records and removes them. Any mismatch leaves the store
    /// untouched.
    pub async fn verify(&self, query: &VerificationQuery) -> Result<String, VerificationError> {
        let id = SubscriptionId::new(query.subscription_id.as_str());

        let deleted = {
            let _guard = self.locks.lock(&id).await;

            let mut record = self
                .store
                .find(&id)
                .await?
                .ok_or_else(|| VerificationError::UnknownSubscription(id.clone()))?;

            let token = query
                .verify_token
                .as_deref()
                .ok_or(VerificationError::MissingParameter("hub.verify_token"))?;
            if !constant_time_eq(token.as_bytes(), record.verify_token.as_bytes()) {
                return Err(VerificationError::TokenMismatch(id));
            }

            if let Some(topic) = query.topic.as_deref() {
                if topic != record.topic_url {
                    return Err(VerificationError::TopicMismatch {
                        id,
                        expected: record.topic_url,
                        actual: topic.to_string(),
                    });
                }
            }

            let subscribe = query.mode == HubMode::Subscribe.as_str();
            let unsubscribe = query.mode == HubMode::Unsubscribe.as_str();

            match record.subscription_state {
                SubscriptionState::NotVerified | SubscriptionState::Verified if subscribe => {
                    let lease = query.lease_seconds.unwrap_or(record.lease_seconds);
                    record.mark_verified(lease);
                    self.store.save(&record).await?;
                    info!(subscription_id = %id, lease_seconds = lease, "subscription verified");
                    false
                }
                SubscriptionState::ToDelete if unsubscribe => {
                    self.store.delete(&id).await?;
                    info!(subscription_id = %id, "unsubscription verified, record removed");
                    true
                }
                state => {
                    return Err(VerificationError::ModeMismatch {
                        id,
                        mode: query.mode.clone(),
                        state,
                    });
                }
            }
        };

        if deleted {
            self.locks.forget(&id);
        }

        Ok(query.challenge.clone())
    }
}

/// Compare secrets without an early exit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[async_trait]
impl CallbackHandler for VerificationHandler {
    async fn verify(&self, query: VerificationQuery) -> VerificationReply {
        match VerificationHandler::verify(self, &query).await {
            Ok(challenge) => VerificationReply::Confirmed(challenge),
            Err(VerificationError::Storage(e)) => {
                warn!(subscription_id = %query.subscription_id, mode = %query.mode, error = %e, "verification deferred, store unavailable");
                VerificationReply::Unavailable
            }
            Err(e) => {
                warn!(subscription_id = %query.subscription_id, mode = %query.mode, error = %e, "verification rejected");
                VerificationReply::Rejected
            }
        }
    }

    async fn is_active(&self, subscription_id: &str) -> bool {
        match self.store.find(&SubscriptionId::new(subscription_id)).await {
            Ok(Some(record)) => record.is_verified(),
            Ok(None) => false,
            Err(e) => {
                debug!(subscription_id, error = %e, "store lookup failed for notification");
                false
            }
        }
    }
}
