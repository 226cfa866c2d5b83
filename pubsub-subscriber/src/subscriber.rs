//! Subscription lifecycle engine.
//!
//! [`SubscriberEngine`] owns the hub registry for one topic and callback,
//! persists subscription records and talks to hubs through an injected
//! [`HubTransport`].
//!
//! Each hub in a batch is handled independently:
//!
//! 1. take the record lock, load or create the record, update it, build
//!    the request and persist the record
//! 2. release the lock
//! 3. send the request, bounded by the hub timeout and the cancel token
//!
//! The record is written before the request goes out because a hub using
//! synchronous verification calls the callback while the request is still
//! open, and the verification handler needs the new token by then. Nothing
//! is written after the send for the same reason.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use hub_client::{BasicAuth, HubRequest, HubTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SubscriberConfig, UnsubscribeTokenPolicy};
use crate::error::{HubError, Result, ValidationError};
use crate::locks::RecordLocks;
use crate::outcome::{send_to_hub, BatchReport, HubOutcome};
use crate::request::{validate_url, RequestBuilder, SubscriptionIntent};
use crate::store::SubscriptionStore;
use crate::token::TokenGenerator;
use crate::types::{HubMode, Subscription, SubscriptionId, SubscriptionState};
use crate::verification::VerificationHandler;

/// What a batch does to each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Subscribe,
    Renew,
    Unsubscribe,
}

impl Action {
    fn mode(self) -> HubMode {
        match self {
            Action::Subscribe | Action::Renew => HubMode::Subscribe,
            Action::Unsubscribe => HubMode::Unsubscribe,
        }
    }
}

/// One hub/topic/callback triple to process.
struct Target {
    hub_url: String,
    topic_url: String,
    callback_url: String,
}

/// Drives subscribe, unsubscribe, renewal and purge against a set of hubs.
pub struct SubscriberEngine {
    transport: Arc<dyn HubTransport>,
    store: Arc<dyn SubscriptionStore>,
    tokens: TokenGenerator,
    builder: RequestBuilder,
    config: SubscriberConfig,
    locks: RecordLocks,
    topic_url: Option<String>,
    callback_url: Option<String>,
    hub_urls: Vec<String>,
    hub_auth: HashMap<String, BasicAuth>,
}

impl SubscriberEngine {
    /// Create an engine. Fails if `config` does not validate.
    pub fn new(
        transport: Arc<dyn HubTransport>,
        store: Arc<dyn SubscriptionStore>,
        config: SubscriberConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            store,
            tokens: TokenGenerator::new(),
            builder: RequestBuilder::from_config(&config),
            config,
            locks: RecordLocks::new(),
            topic_url: None,
            callback_url: None,
            hub_urls: Vec::new(),
            hub_auth: HashMap::new(),
        })
    }

    /// Replace the verify token source.
    pub fn with_token_generator(mut self, tokens: TokenGenerator) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn set_topic_url(&mut self, topic_url: &str) -> Result<()> {
        validate_url("topic", topic_url)?;
        self.topic_url = Some(topic_url.to_string());
        Ok(())
    }

    pub fn topic_url(&self) -> Option<&str> {
        self.topic_url.as_deref()
    }

    /// Set the callback base URL. The subscription id is appended per hub.
    pub fn set_callback_url(&mut self, callback_url: &str) -> Result<()> {
        validate_url("callback", callback_url)?;
        self.callback_url = Some(callback_url.to_string());
        Ok(())
    }

    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    /// Register a hub. Adding a hub twice keeps one entry.
    pub fn add_hub_url(&mut self, hub_url: &str) -> Result<()> {
        validate_url("hub", hub_url)?;
        if !self.hub_urls.iter().any(|h| h == hub_url) {
            self.hub_urls.push(hub_url.to_string());
        }
        Ok(())
    }

    /// Register several hubs; stops at the first invalid URL.
    pub fn add_hub_urls<I, S>(&mut self, hub_urls: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for hub_url in hub_urls {
            self.add_hub_url(hub_url.as_ref())?;
        }
        Ok(())
    }

    /// Unregister a hub. Returns whether it was registered.
    pub fn remove_hub_url(&mut self, hub_url: &str) -> bool {
        let before = self.hub_urls.len();
        self.hub_urls.retain(|h| h != hub_url);
        self.hub_auth.remove(hub_url);
        self.hub_urls.len() != before
    }

    /// Registered hubs in registration order.
    pub fn hub_urls(&self) -> &[String] {
        &self.hub_urls
    }

    /// Send HTTP basic credentials with every request to `hub_url`.
    pub fn set_hub_authentication(
        &mut self,
        hub_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.hub_auth
            .insert(hub_url.to_string(), BasicAuth::new(username, password));
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    /// Handler for the callback server, sharing this engine's store and
    /// record locks.
    pub fn verification_handler(&self) -> VerificationHandler {
        VerificationHandler::new(self.store.clone(), self.locks.clone())
    }

    /// Subscribe the topic at every registered hub.
    ///
    /// # Errors
    ///
    /// Returns `SubscriberError::Validation` without contacting any hub if
    /// the topic, callback or hub list is missing. Per-hub failures are in
    /// the report.
    pub async fn subscribe_all(&self) -> Result<BatchReport> {
        self.subscribe_all_cancellable(&CancellationToken::new()).await
    }

    pub async fn subscribe_all_cancellable(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        let targets = self.registered_targets()?;
        Ok(self.run_batch(Action::Subscribe, targets, cancel).await)
    }

    /// Unsubscribe the topic at every registered hub.
    ///
    /// Each record is left in `ToDelete` whatever the hub answers; it is
    /// removed when the hub verifies or by [`purge`](Self::purge).
    pub async fn unsubscribe_all(&self) -> Result<BatchReport> {
        self.unsubscribe_all_cancellable(&CancellationToken::new()).await
    }

    pub async fn unsubscribe_all_cancellable(&self, cancel: &CancellationToken) -> Result<BatchReport> {
        let targets = self.registered_targets()?;
        Ok(self.run_batch(Action::Unsubscribe, targets, cancel).await)
    }

    /// Re-subscribe every verified record expiring within `threshold`.
    ///
    /// Works from the store, so it covers every topic and hub the store
    /// knows about, not just the registered ones.
    pub async fn renew_expiring(&self, threshold: Duration) -> Result<BatchReport> {
        self.renew_expiring_cancellable(threshold, &CancellationToken::new())
            .await
    }

    pub async fn renew_expiring_cancellable(
        &self,
        threshold: Duration,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        let now = Utc::now();
        let targets: Vec<Target> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|record| record.is_verified())
            .filter(|record| {
                // A lease already past expiry has a negative remainder
                record
                    .time_until_expiry(now)
                    .is_some_and(|left| left.to_std().map_or(true, |left| left <= threshold))
            })
            .map(|record| Target {
                hub_url: record.hub_url,
                topic_url: record.topic_url,
                callback_url: record.callback_url,
            })
            .collect();

        debug!(count = targets.len(), ?threshold, "renewing expiring subscriptions");
        Ok(self.run_batch(Action::Renew, targets, cancel).await)
    }

    /// Delete `ToDelete` records untouched for at least `grace`.
    ///
    /// Returns the number of records removed.
    pub async fn purge(&self, grace: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for candidate in self.store.list().await? {
            if candidate.subscription_state != SubscriptionState::ToDelete {
                continue;
            }

            let id = candidate.id;
            {
                let _guard = self.locks.lock(&id).await;

                // Re-read under the lock; a concurrent subscribe may have revived it
                let Some(record) = self.store.find(&id).await? else {
                    continue;
                };
                let stale = (now - record.updated_at)
                    .to_std()
                    .is_ok_and(|age| age >= grace);
                if record.subscription_state != SubscriptionState::ToDelete || !stale {
                    continue;
                }

                self.store.delete(&id).await?;
            }

            self.locks.forget(&id);
            info!(subscription_id = %id, "purged unsubscribed record");
            removed += 1;
        }

        Ok(removed)
    }

    fn registered_targets(&self) -> std::result::Result<Vec<Target>, ValidationError> {
        let topic_url = self
            .topic_url
            .as_deref()
            .ok_or(ValidationError::MissingUrl("topic"))?;
        let callback_url = self
            .callback_url
            .as_deref()
            .ok_or(ValidationError::MissingUrl("callback"))?;
        if self.hub_urls.is_empty() {
            return Err(ValidationError::NoHubs);
        }

        Ok(self
            .hub_urls
            .iter()
            .map(|hub_url| Target {
                hub_url: hub_url.clone(),
                topic_url: topic_url.to_string(),
                callback_url: callback_url.to_string(),
            })
            .collect())
    }

    async fn run_batch(&self, action: Action, targets: Vec<Target>, cancel: &CancellationToken) -> BatchReport {
        let outcomes = stream::iter(targets.into_iter().map(|target| self.process(action, target, cancel)))
            .buffered(self.config.max_concurrent_hubs)
            .collect::<Vec<_>>()
            .await;

        let report = BatchReport::new(outcomes);
        info!(
            ?action,
            hubs = report.len(),
            failed = report.failures().count(),
            "hub batch finished"
        );
        report
    }

    async fn process(&self, action: Action, target: Target, cancel: &CancellationToken) -> HubOutcome {
        let id = SubscriptionId::derive(&target.hub_url, &target.topic_url, &target.callback_url);

        let result = if cancel.is_cancelled() {
            Err(HubError::Cancelled)
        } else {
            match self.prepare(action, &target, &id).await {
                Ok(request) => {
                    send_to_hub(self.transport.as_ref(), &request, self.config.hub_timeout, cancel).await
                }
                Err(e) => Err(e),
            }
        };

        match &result {
            Ok(accepted) => info!(
                hub = %target.hub_url,
                subscription_id = %id,
                status = accepted.status,
                deferred = accepted.deferred,
                mode = %action.mode(),
                "hub accepted request"
            ),
            Err(e) => warn!(
                hub = %target.hub_url,
                subscription_id = %id,
                mode = %action.mode(),
                error = %e,
                "hub request failed"
            ),
        }

        HubOutcome {
            hub_url: target.hub_url,
            subscription_id: Some(id),
            result,
        }
    }

    /// Update and persist the record, then return the request to send.
    async fn prepare(
        &self,
        action: Action,
        target: &Target,
        id: &SubscriptionId,
    ) -> std::result::Result<HubRequest, HubError> {
        let _guard = self.locks.lock(id).await;
        let existing = self.store.find(id).await?;

        let record = match (action, existing) {
            (Action::Subscribe, Some(mut record)) => {
                record.verify_token = self.tokens.generate(id);
                record.lease_seconds = self.config.lease_seconds;
                record.transition(SubscriptionState::NotVerified);
                record
            }
            (Action::Renew, Some(mut record)) => {
                record.verify_token = self.tokens.generate(id);
                let state = record.subscription_state;
                record.transition(state);
                record
            }
            (Action::Subscribe | Action::Renew, None) => self.new_record(target, id),
            (Action::Unsubscribe, existing) => {
                let mut record = existing.unwrap_or_else(|| self.new_record(target, id));
                let reuse = self.config.unsubscribe_token == UnsubscribeTokenPolicy::Reuse
                    && !record.verify_token.is_empty();
                if !reuse {
                    record.verify_token = self.tokens.generate(id);
                }
                record.transition(SubscriptionState::ToDelete);
                record
            }
        };

        let request = self
            .builder
            .build(&SubscriptionIntent {
                mode: action.mode(),
                topic_url: &record.topic_url,
                hub_url: &record.hub_url,
                callback_url: &record.callback_url,
                lease_seconds: self.config.lease_seconds,
                verify_token: &record.verify_token,
            })?
            .with_basic_auth(self.hub_auth.get(&record.hub_url).cloned());

        self.store.save(&record).await?;
        debug!(subscription_id = %id, state = %record.subscription_state, "record persisted before send");

        Ok(request)
    }

    fn new_record(&self, target: &Target, id: &SubscriptionId) -> Subscription {
        Subscription::new(
            target.hub_url.as_str(),
            target.topic_url.as_str(),
            target.callback_url.as_str(),
            self.tokens.generate(id),
            self.config.lease_seconds,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscriberError;
    use crate::store::MemorySubscriptionStore;
    use async_trait::async_trait;
    use hub_client::{HubResponse, TransportError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<HubRequest>>,
    }

    #[async_trait]
    impl HubTransport for RecordingTransport {
        async fn send(&self, request: &HubRequest) -> std::result::Result<HubResponse, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(HubResponse::new(204, ""))
        }
    }

    fn engine() -> (SubscriberEngine, Arc<RecordingTransport>, Arc<MemorySubscriptionStore>) {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MemorySubscriptionStore::new());
        let engine = SubscriberEngine::new(transport.clone(), store.clone(), SubscriberConfig::default())
            .unwrap()
            .with_token_generator(TokenGenerator::fixed("abc"));
        (engine, transport, store)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SubscriberEngine::new(
            Arc::new(RecordingTransport::default()),
            Arc::new(MemorySubscriptionStore::new()),
            SubscriberConfig::new().with_max_concurrent_hubs(0),
        );
        assert!(matches!(result, Err(SubscriberError::Configuration(_))));
    }

    #[test]
    fn test_hub_registry() {
        let (mut engine, _, _) = engine();

        engine
            .add_hub_urls(["http://a.example.com/", "http://b.example.com/", "http://a.example.com/"])
            .unwrap();
        assert_eq!(engine.hub_urls(), ["http://a.example.com/", "http://b.example.com/"]);

        assert!(engine.add_hub_url("not a url").is_err());
        assert!(engine.remove_hub_url("http://a.example.com/"));
        assert!(!engine.remove_hub_url("http://a.example.com/"));
        assert_eq!(engine.hub_urls(), ["http://b.example.com/"]);

        assert!(engine.set_topic_url("/relative").is_err());
        assert!(engine.topic_url().is_none());
    }

    #[tokio::test]
    async fn test_preflight_sends_nothing() {
        let (mut engine, transport, _) = engine();

        let err = engine.subscribe_all().await.unwrap_err();
        assert!(matches!(err, SubscriberError::Validation(ValidationError::MissingUrl("topic"))));

        engine.set_topic_url("http://www.example.com/topic").unwrap();
        engine.set_callback_url("http://www.example.com/callback").unwrap();
        let err = engine.unsubscribe_all().await.unwrap_err();
        assert!(matches!(err, SubscriberError::Validation(ValidationError::NoHubs)));

        assert!(transport.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_basic_auth_attached() {
        let (mut engine, transport, _) = engine();
        engine.set_topic_url("http://www.example.com/topic").unwrap();
        engine.set_callback_url("http://www.example.com/callback").unwrap();
        engine.add_hub_urls(["http://a.example.com/", "http://b.example.com/"]).unwrap();
        engine.set_hub_authentication("http://b.example.com/", "user", "secret");

        engine.subscribe_all().await.unwrap();

        let requests = transport.requests.lock().unwrap();
        let sent_to = |hub: &str| requests.iter().find(|r| r.url == hub).unwrap().clone();
        assert!(sent_to("http://a.example.com/").basic_auth.is_none());
        let auth = sent_to("http://b.example.com/").basic_auth.unwrap();
        assert_eq!((auth.username.as_str(), auth.password.as_str()), ("user", "secret"));
    }

    #[tokio::test]
    async fn test_renew_keeps_verified_and_rotates_token() {
        let transport = Arc::new(RecordingTransport::default());
        let store = Arc::new(MemorySubscriptionStore::new());
        let engine = SubscriberEngine::new(transport.clone(), store.clone(), SubscriberConfig::default()).unwrap();

        let mut soon = Subscription::new("http://a.example.com/", "http://t.example.com/", "http://c.example.com/", "old", 60);
        soon.mark_verified(60);
        let mut later = Subscription::new("http://b.example.com/", "http://t.example.com/", "http://c.example.com/", "old", 60);
        later.mark_verified(30 * 24 * 3600);
        let pending = Subscription::new("http://c.example.com/", "http://t.example.com/", "http://c.example.com/", "old", 60);
        for record in [&soon, &later, &pending] {
            store.save(record).await.unwrap();
        }

        let report = engine.renew_expiring(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.outcomes[0].hub_url, "http://a.example.com/");

        let renewed = store.find(&soon.id).await.unwrap().unwrap();
        assert_eq!(renewed.subscription_state, SubscriptionState::Verified);
        assert_ne!(renewed.verify_token, "old");
        assert_eq!(store.find(&later.id).await.unwrap().unwrap().verify_token, "old");

        let body = &transport.requests.lock().unwrap()[0].body;
        assert!(body.contains("hub.mode=subscribe"));
        assert!(body.contains(&format!("hub.verify_token={}", renewed.verify_token)));
    }

    #[tokio::test]
    async fn test_purge_respects_grace() {
        let (engine, _, store) = engine();

        let mut old = Subscription::new("h1", "t", "c", "abc", 60);
        old.transition(SubscriptionState::ToDelete);
        old.updated_at = Utc::now() - chrono::Duration::hours(2);
        let mut fresh = Subscription::new("h2", "t", "c", "abc", 60);
        fresh.transition(SubscriptionState::ToDelete);
        let live = Subscription::new("h3", "t", "c", "abc", 60);
        for record in [&old, &fresh, &live] {
            store.save(record).await.unwrap();
        }

        let removed = engine.purge(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find(&old.id).await.unwrap().is_none());
        assert!(store.find(&fresh.id).await.unwrap().is_some());
        assert!(store.find(&live.id).await.unwrap().is_some());
    }
}
