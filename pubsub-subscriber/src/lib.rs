//! PubSubHubbub subscriber and publisher engine.
//!
//! This crate keeps a topic subscribed at one or more hubs and answers the
//! hubs' verification callbacks.
//!
//! # Architecture
//!
//! - [`SubscriberEngine`] runs subscribe, unsubscribe, renewal and purge
//!   batches, one [`HubOutcome`] per hub.
//! - [`RequestBuilder`] renders the canonical form-encoded hub requests.
//! - [`SubscriptionStore`] persists records; [`MemorySubscriptionStore`] and
//!   [`JsonFileSubscriptionStore`] are provided.
//! - [`VerificationHandler`] checks hub callbacks and plugs into
//!   [`callback_server::CallbackServer`] as its `CallbackHandler`.
//! - [`Publisher`] sends `hub.mode=publish` notifications.
//!
//! Hub I/O goes through the [`hub_client::HubTransport`] trait, so tests can
//! substitute a fake hub.
//!
//! # Example
//!
//! ```no_run
//! use callback_server::{CallbackServer, EventRouter};
//! use hub_client::HttpHubClient;
//! use pubsub_subscriber::{JsonFileSubscriptionStore, SubscriberConfig, SubscriberEngine};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(JsonFileSubscriptionStore::new("subscriptions.json"));
//!     let mut engine = SubscriberEngine::new(
//!         Arc::new(HttpHubClient::new()),
//!         store,
//!         SubscriberConfig::default(),
//!     )?;
//!
//!     let (tx, mut notifications) = mpsc::unbounded_channel();
//!     let router = EventRouter::new(Arc::new(engine.verification_handler()), tx);
//!     let server = CallbackServer::new((3400, 3500), router).await?;
//!
//!     engine.set_topic_url("https://example.com/feed.xml")?;
//!     engine.set_callback_url(&server.callback_url("/callback"))?;
//!     engine.add_hub_url("https://pubsubhubbub.appspot.com/")?;
//!
//!     let report = engine.subscribe_all().await?;
//!     for failure in report.failures() {
//!         eprintln!("{}: {:?}", failure.hub_url, failure.result);
//!     }
//!
//!     while let Some(update) = notifications.recv().await {
//!         println!("new content for {}", update.subscription_id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod locks;
pub mod logging;
pub mod outcome;
pub mod publisher;
pub mod request;
pub mod store;
pub mod subscriber;
pub mod token;
pub mod types;
pub mod verification;

pub use config::{CallbackStyle, SubscriberConfig, UnsubscribeTokenPolicy};
pub use error::{HubError, Result, StorageError, SubscriberError, ValidationError, VerificationError};
pub use locks::RecordLocks;
pub use outcome::{BatchReport, HubAccepted, HubOutcome};
pub use publisher::Publisher;
pub use request::{RequestBuilder, SubscriptionIntent};
pub use store::{JsonFileSubscriptionStore, MemorySubscriptionStore, SubscriptionStore};
pub use subscriber::SubscriberEngine;
pub use token::TokenGenerator;
pub use verification::VerificationHandler;
pub use types::{
    HubMode, Subscription, SubscriptionId, SubscriptionState, VerifyMode, DEFAULT_LEASE_SECONDS,
    SUBSCRIPTION_NOTVERIFIED, SUBSCRIPTION_TODELETE, SUBSCRIPTION_VERIFIED,
};

// Re-exported so callers need not depend on the sibling crates directly
pub use callback_server;
pub use hub_client;
pub use tokio_util::sync::CancellationToken;
