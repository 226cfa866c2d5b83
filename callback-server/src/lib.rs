//! Generic PubSubHubbub callback server.
//!
//! This crate provides a lightweight HTTP server for the subscriber side of
//! the PubSubHubbub protocol. It has no knowledge of how subscriptions are
//! stored; that decision is delegated to a [`CallbackHandler`].
//!
//! # Overview
//!
//! - [`CallbackServer`]: binds a local port and answers hub requests.
//! - [`EventRouter`]: sends verification requests to the handler and
//!   forwards content notifications of active subscriptions to a channel.
//! - [`VerificationQuery`] / [`NotificationPayload`]: the decoded hub
//!   requests.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use callback_server::{
//!     CallbackHandler, CallbackServer, EventRouter, VerificationQuery, VerificationReply,
//! };
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! struct AcceptEverything;
//!
//! #[async_trait]
//! impl CallbackHandler for AcceptEverything {
//!     async fn verify(&self, query: VerificationQuery) -> VerificationReply {
//!         VerificationReply::Confirmed(query.challenge)
//!     }
//!
//!     async fn is_active(&self, _subscription_id: &str) -> bool {
//!         true
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let router = EventRouter::new(Arc::new(AcceptEverything), tx);
//!     let server = CallbackServer::new((3400, 3500), router).await?;
//!
//!     println!("Callback server listening at: {}", server.base_url());
//!
//!     while let Some(notification) = rx.recv().await {
//!         println!("{} bytes for {}", notification.body.len(), notification.subscription_id);
//!     }
//!
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod error;
pub mod router;
mod server;

pub use error::CallbackServerError;
pub use router::{
    CallbackHandler, EventRouter, NotificationPayload, VerificationQuery, VerificationReply,
    SUBSCRIPTION_PARAM,
};
pub use server::CallbackServer;
