//! Publisher side: tell hubs that topics have new content.

use futures::stream::{self, StreamExt};
use hub_client::{BasicAuth, HubTransport};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SubscriberConfig;
use crate::error::{HubError, Result, ValidationError};
use crate::outcome::{send_to_hub, BatchReport, HubOutcome};
use crate::request::{validate_url, RequestBuilder};

/// Sends `hub.mode=publish` notifications for updated topics.
pub struct Publisher {
    transport: Arc<dyn HubTransport>,
    builder: RequestBuilder,
    config: SubscriberConfig,
    hub_urls: Vec<String>,
    topic_urls: Vec<String>,
    hub_auth: HashMap<String, BasicAuth>,
}

impl Publisher {
    pub fn new(transport: Arc<dyn HubTransport>, config: SubscriberConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            transport,
            builder: RequestBuilder::from_config(&config),
            config,
            hub_urls: Vec::new(),
            topic_urls: Vec::new(),
            hub_auth: HashMap::new(),
        })
    }

    pub fn add_hub_url(&mut self, hub_url: &str) -> Result<()> {
        validate_url("hub", hub_url)?;
        if !self.hub_urls.iter().any(|h| h == hub_url) {
            self.hub_urls.push(hub_url.to_string());
        }
        Ok(())
    }

    pub fn hub_urls(&self) -> &[String] {
        &self.hub_urls
    }

    pub fn set_hub_authentication(
        &mut self,
        hub_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) {
        self.hub_auth
            .insert(hub_url.to_string(), BasicAuth::new(username, password));
    }

    /// Queue a topic for the next [`notify_all`](Self::notify_all).
    pub fn add_updated_topic_url(&mut self, topic_url: &str) -> Result<()> {
        validate_url("topic", topic_url)?;
        if !self.topic_urls.iter().any(|t| t == topic_url) {
            self.topic_urls.push(topic_url.to_string());
        }
        Ok(())
    }

    pub fn updated_topic_urls(&self) -> &[String] {
        &self.topic_urls
    }

    pub fn clear_updated_topic_urls(&mut self) {
        self.topic_urls.clear();
    }

    /// Notify every hub of every queued topic, one request per hub.
    ///
    /// The queue is left as is; call
    /// [`clear_updated_topic_urls`](Self::clear_updated_topic_urls) once the
    /// report is satisfactory.
    pub async fn notify_all(&self) -> Result<BatchReport> {
        if self.hub_urls.is_empty() {
            return Err(ValidationError::NoHubs.into());
        }
        if self.topic_urls.is_empty() {
            return Err(ValidationError::NoTopics.into());
        }

        let cancel = CancellationToken::new();
        let outcomes = stream::iter(self.hub_urls.iter().map(|hub_url| self.notify_hub(hub_url, &cancel)))
            .buffered(self.config.max_concurrent_hubs)
            .collect::<Vec<_>>()
            .await;

        Ok(BatchReport::new(outcomes))
    }

    async fn notify_hub(&self, hub_url: &str, cancel: &CancellationToken) -> HubOutcome {
        let result = match self.builder.build_publish(hub_url, &self.topic_urls) {
            Ok(request) => {
                let request = request.with_basic_auth(self.hub_auth.get(hub_url).cloned());
                send_to_hub(self.transport.as_ref(), &request, self.config.hub_timeout, cancel).await
            }
            Err(e) => Err(HubError::from(e)),
        };

        match &result {
            Ok(accepted) => info!(hub = %hub_url, status = accepted.status, topics = self.topic_urls.len(), "publish accepted"),
            Err(e) => warn!(hub = %hub_url, error = %e, "publish failed"),
        }

        HubOutcome {
            hub_url: hub_url.to_string(),
            subscription_id: None,
            result,
        }
    }
}
