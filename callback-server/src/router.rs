//! Routing for hub callbacks.
//!
//! This module provides the `EventRouter` which hands hub verification
//! requests to a [`CallbackHandler`] and forwards content notifications for
//! active subscriptions to a channel.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Query parameter carrying the subscription id on callback URLs
pub const SUBSCRIPTION_PARAM: &str = "xhub.subscription";

/// A hub's intent verification request (`GET` on the callback URL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationQuery {
    /// Subscription id taken from the callback URL
    pub subscription_id: String,
    /// `hub.mode`: `subscribe` or `unsubscribe`
    pub mode: String,
    /// `hub.topic`
    pub topic: Option<String>,
    /// `hub.challenge`, echoed back on success
    pub challenge: String,
    /// `hub.verify_token`
    pub verify_token: Option<String>,
    /// `hub.lease_seconds` granted by the hub (subscribe only)
    pub lease_seconds: Option<u64>,
}

impl VerificationQuery {
    /// Build a query from decoded callback parameters.
    ///
    /// Returns `None` when `hub.mode` or `hub.challenge` is missing, which
    /// means the request is not a verification at all.
    pub fn from_params(subscription_id: String, params: &HashMap<String, String>) -> Option<Self> {
        let mode = params.get("hub.mode")?.clone();
        let challenge = params.get("hub.challenge")?.clone();

        Some(Self {
            subscription_id,
            mode,
            topic: params.get("hub.topic").cloned(),
            challenge,
            verify_token: params.get("hub.verify_token").cloned(),
            lease_seconds: params
                .get("hub.lease_seconds")
                .and_then(|value| value.parse::<u64>().ok()),
        })
    }
}

/// Answer to a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationReply {
    /// Intent confirmed; the challenge is echoed with a 2xx
    Confirmed(String),
    /// Intent not recognised; the hub receives a 404
    Rejected,
    /// The subscriber cannot decide right now; the hub receives a 503 and
    /// is expected to retry
    Unavailable,
}

/// Content pushed by a hub for an active subscription.
#[derive(Debug, Clone)]
pub struct NotificationPayload {
    /// The subscription id from the callback URL
    pub subscription_id: String,
    /// `Content-Type` of the pushed feed, if the hub sent one
    pub content_type: Option<String>,
    /// Feed body exactly as pushed; its charset is whatever the content
    /// type or XML prolog declares
    pub body: Bytes,
}

/// Decision logic behind the callback endpoint.
///
/// The server only speaks HTTP; the subscriber implements this trait to
/// check verification requests against its stored subscriptions.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    /// Validate a hub verification request.
    async fn verify(&self, query: VerificationQuery) -> VerificationReply;

    /// Whether content notifications for this subscription are accepted.
    async fn is_active(&self, subscription_id: &str) -> bool;
}

/// Routes hub callbacks to the handler and notification channel.
#[derive(Clone)]
pub struct EventRouter {
    handler: Arc<dyn CallbackHandler>,
    event_sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    /// Create a new router.
    ///
    /// # Arguments
    ///
    /// * `handler` - Decides on verification requests and active subscriptions
    /// * `event_sender` - Channel receiving content notifications
    pub fn new(
        handler: Arc<dyn CallbackHandler>,
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Self {
        Self {
            handler,
            event_sender,
        }
    }

    /// Route a verification request to the handler.
    pub async fn route_verification(&self, query: VerificationQuery) -> VerificationReply {
        self.handler.verify(query).await
    }

    /// Route an incoming content notification to the channel.
    ///
    /// Returns `true` if the subscription is active and the payload was
    /// forwarded, `false` if it was dropped.
    pub async fn route_event(
        &self,
        subscription_id: String,
        content_type: Option<String>,
        body: Bytes,
    ) -> bool {
        if !self.handler.is_active(&subscription_id).await {
            return false;
        }

        let payload = NotificationPayload {
            subscription_id,
            content_type,
            body,
        };

        // Receiver may be gone during shutdown
        let _ = self.event_sender.send(payload);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct StaticHandler {
        active: HashSet<String>,
    }

    #[async_trait]
    impl CallbackHandler for StaticHandler {
        async fn verify(&self, query: VerificationQuery) -> VerificationReply {
            if self.active.contains(&query.subscription_id) && query.verify_token.as_deref() == Some("abc") {
                VerificationReply::Confirmed(query.challenge)
            } else {
                VerificationReply::Rejected
            }
        }

        async fn is_active(&self, subscription_id: &str) -> bool {
            self.active.contains(subscription_id)
        }
    }

    fn router_with(active: &[&str]) -> (EventRouter, mpsc::UnboundedReceiver<NotificationPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = StaticHandler {
            active: active.iter().map(|s| s.to_string()).collect(),
        };
        (EventRouter::new(Arc::new(handler), tx), rx)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_from_params() {
        let query = VerificationQuery::from_params(
            "sub-1".to_string(),
            &params(&[
                ("hub.mode", "subscribe"),
                ("hub.topic", "http://www.example.com/topic"),
                ("hub.challenge", "xyz"),
                ("hub.verify_token", "abc"),
                ("hub.lease_seconds", "86400"),
            ]),
        )
        .unwrap();

        assert_eq!(query.mode, "subscribe");
        assert_eq!(query.topic.as_deref(), Some("http://www.example.com/topic"));
        assert_eq!(query.challenge, "xyz");
        assert_eq!(query.lease_seconds, Some(86400));
    }

    #[test]
    fn test_query_requires_mode_and_challenge() {
        assert!(VerificationQuery::from_params("s".into(), &params(&[("hub.mode", "subscribe")])).is_none());
        assert!(VerificationQuery::from_params("s".into(), &params(&[("hub.challenge", "x")])).is_none());
    }

    #[test]
    fn test_query_ignores_bad_lease() {
        let query = VerificationQuery::from_params(
            "s".into(),
            &params(&[("hub.mode", "subscribe"), ("hub.challenge", "x"), ("hub.lease_seconds", "soon")]),
        )
        .unwrap();
        assert_eq!(query.lease_seconds, None);
    }

    #[tokio::test]
    async fn test_route_event_for_active_subscription() {
        let (router, mut rx) = router_with(&["sub-1"]);

        let routed = router
            .route_event("sub-1".to_string(), Some("application/atom+xml".to_string()), Bytes::from_static(b"<feed/>"))
            .await;
        assert!(routed);

        let payload = rx.recv().await.unwrap();
        assert_eq!(payload.subscription_id, "sub-1");
        assert_eq!(payload.content_type.as_deref(), Some("application/atom+xml"));
        assert_eq!(&payload.body[..], b"<feed/>");
    }

    #[tokio::test]
    async fn test_route_event_unknown_subscription() {
        let (router, mut rx) = router_with(&[]);

        let routed = router.route_event("unknown".to_string(), None, Bytes::from_static(b"<feed/>")).await;
        assert!(!routed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_route_verification_delegates_to_handler() {
        let (router, _rx) = router_with(&["sub-1"]);
        let query = VerificationQuery {
            subscription_id: "sub-1".to_string(),
            mode: "subscribe".to_string(),
            topic: None,
            challenge: "xyz".to_string(),
            verify_token: Some("abc".to_string()),
            lease_seconds: None,
        };

        assert_eq!(
            router.route_verification(query.clone()).await,
            VerificationReply::Confirmed("xyz".to_string())
        );

        let wrong = VerificationQuery {
            verify_token: Some("nope".to_string()),
            ..query
        };
        assert_eq!(router.route_verification(wrong).await, VerificationReply::Rejected);
    }
}
