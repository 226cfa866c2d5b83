//! Private HTTP client for PubSubHubbub hub communication
//!
//! This crate provides the transport collaborator used by the subscriber:
//! a [`HubRequest`] carrying an already-encoded form body, the
//! [`HubTransport`] seam the subscriber talks through, and a minimal
//! reqwest-backed [`HttpHubClient`].

mod error;

pub use error::TransportError;

use async_trait::async_trait;
use std::time::Duration;

/// Content type of every hub request body
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP basic credentials some hubs require
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A form-encoded POST request addressed to a hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubRequest {
    /// Hub endpoint URL
    pub url: String,
    /// `application/x-www-form-urlencoded` body, already encoded
    pub body: String,
    /// Optional basic authentication for this hub
    pub basic_auth: Option<BasicAuth>,
}

impl HubRequest {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            basic_auth: None,
        }
    }

    pub fn with_basic_auth(mut self, auth: Option<BasicAuth>) -> Self {
        self.basic_auth = auth;
        self
    }
}

/// Response returned by a hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body, usually empty or a short diagnostic
    pub body: String,
}

impl HubResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Any 2xx means the hub accepted the request for processing
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `202 Accepted`: the hub will verify asynchronously
    pub fn is_deferred(&self) -> bool {
        self.status == 202
    }
}

/// Request/response exchange with a hub
///
/// Implementations only move bytes; interpreting the status code is the
/// caller's job. A non-2xx response is still `Ok`.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn send(&self, request: &HubRequest) -> Result<HubResponse, TransportError>;
}

/// A minimal reqwest-backed hub client
#[derive(Debug, Clone)]
pub struct HttpHubClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpHubClient {
    /// Create a new hub client with default timeouts (5s connect, 10s request)
    ///
    /// If the TLS backend cannot be initialised with those settings, a
    /// warning is logged and a client without the connect timeout is used;
    /// the request timeout is still enforced per request.
    pub fn new() -> Self {
        let connect_timeout = Duration::from_secs(5);
        let request_timeout = Duration::from_secs(10);

        match Self::with_timeouts(connect_timeout, request_timeout) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default HTTP client settings");
                Self {
                    client: reqwest::Client::new(),
                    request_timeout,
                }
            }
        }
    }

    /// Create a hub client with explicit timeouts
    pub fn with_timeouts(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            request_timeout,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn map_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.request_timeout)
        } else if error.is_builder() {
            TransportError::InvalidRequest(error.to_string())
        } else {
            TransportError::Network(error.to_string())
        }
    }
}

impl Default for HttpHubClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubTransport for HttpHubClient {
    async fn send(&self, request: &HubRequest) -> Result<HubResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .timeout(self.request_timeout)
            .body(request.body.clone());

        if let Some(auth) = &request.basic_auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_error(e))?;

        tracing::debug!(hub = %request.url, status, "hub responded");

        Ok(HubResponse { status, body })
    }
}
