//! HTTP server for receiving hub callbacks.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::mpsc;
use warp::http::{Method, StatusCode};
use warp::Filter;

use super::error::CallbackServerError;
use super::router::{EventRouter, VerificationQuery, VerificationReply, SUBSCRIPTION_PARAM};

/// HTTP callback server for PubSubHubbub hubs.
///
/// The `CallbackServer` binds to a local port and serves the subscriber's
/// callback URL. Hubs hit it with:
///
/// - `GET` intent verification requests (`hub.mode`, `hub.topic`,
///   `hub.challenge`, `hub.verify_token`, `hub.lease_seconds`), answered
///   with the challenge on success and `404` otherwise;
/// - `POST` content distribution requests, answered `200` for active
///   subscriptions and `404` otherwise.
///
/// The subscription id is read from the `xhub.subscription` query
/// parameter, or from the last path segment for path-style callbacks.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use tokio::sync::mpsc;
/// # use callback_server::{CallbackHandler, CallbackServer, EventRouter};
/// # async fn run(handler: Arc<dyn CallbackHandler>) {
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let router = EventRouter::new(handler, tx);
///
/// let server = CallbackServer::new((3400, 3500), router)
///     .await
///     .expect("Failed to create callback server");
///
/// println!("Callback URL: {}", server.base_url());
///
/// while let Some(notification) = rx.recv().await {
///     println!("Update for subscription {}", notification.subscription_id);
/// }
/// # }
/// ```
pub struct CallbackServer {
    /// The port the server is bound to
    port: u16,
    /// The base URL handed to hubs as callback
    base_url: String,
    /// Router for verification and notification requests
    event_router: Arc<EventRouter>,
    /// Shutdown signal sender
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Create and start a callback server on the first free port in range.
    ///
    /// The base URL is built from the detected local IP address. Use
    /// [`CallbackServer::with_base_url`] when hubs reach the subscriber
    /// through a public hostname or reverse proxy.
    pub async fn new(port_range: (u16, u16), router: EventRouter) -> Result<Self, CallbackServerError> {
        Self::with_base_url(port_range, router, None).await
    }

    /// Create and start a callback server with an explicit public base URL.
    ///
    /// # Arguments
    ///
    /// * `port_range` - Range of ports to try binding to (start, end)
    /// * `router` - Router receiving verifications and notifications
    /// * `base_url` - Public URL of the server; detected when `None`
    pub async fn with_base_url(
        port_range: (u16, u16),
        router: EventRouter,
        base_url: Option<String>,
    ) -> Result<Self, CallbackServerError> {
        let port = Self::find_available_port(port_range.0, port_range.1).ok_or(
            CallbackServerError::NoAvailablePort {
                start: port_range.0,
                end: port_range.1,
            },
        )?;

        let base_url = match base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                let local_ip = Self::detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
                format!("http://{local_ip}:{port}")
            }
        };

        let event_router = Arc::new(router);

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);

        let server_handle = Self::start_server(port, event_router.clone(), shutdown_rx, ready_tx);

        ready_rx
            .recv()
            .await
            .ok_or_else(|| CallbackServerError::Startup("server task exited before binding".to_string()))?;

        Ok(Self {
            port,
            base_url,
            event_router,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Base URL to register as the subscriber callback.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Callback URL for a path below the base URL, e.g. `"/feeds/callback"`.
    pub fn callback_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Get the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the event router.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Shutdown the callback server gracefully.
    ///
    /// Sends a shutdown signal to the HTTP server and waits for in-flight
    /// requests to complete.
    pub async fn shutdown(mut self) -> Result<(), CallbackServerError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }

        if let Some(handle) = self.server_handle.take() {
            handle
                .await
                .map_err(|e| CallbackServerError::Shutdown(e.to_string()))?;
        }

        Ok(())
    }

    /// Find an available port in the given range.
    fn find_available_port(start: u16, end: u16) -> Option<u16> {
        (start..=end).find(|&port| Self::is_port_available(port))
    }

    /// Check if a port is available for binding.
    fn is_port_available(port: u16) -> bool {
        TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).is_ok()
    }

    /// Detect the local IP address for callback URLs.
    ///
    /// Uses a UDP socket "connection" to learn which interface would route
    /// outbound traffic. No data is sent.
    fn detect_local_ip() -> Option<IpAddr> {
        let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        let local_addr = socket.local_addr().ok()?;
        Some(local_addr.ip())
    }

    /// Resolve the subscription id from the query, falling back to the
    /// last path segment for path-style callbacks.
    fn subscription_id(path: &str, params: &HashMap<String, String>) -> Option<String> {
        if let Some(id) = params.get(SUBSCRIPTION_PARAM).filter(|id| !id.is_empty()) {
            return Some(id.clone());
        }

        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .map(str::to_string)
    }

    /// Start the HTTP server on the given port.
    fn start_server(
        port: u16,
        event_router: Arc<EventRouter>,
        mut shutdown_rx: mpsc::Receiver<()>,
        ready_tx: mpsc::Sender<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            // One route for every path and method; dispatching by method
            // here keeps unknown subscriptions a 404 rather than a 405.
            let callback_route = warp::method()
                .and(warp::path::full())
                .and(warp::query::<HashMap<String, String>>())
                .and(warp::header::optional::<String>("content-type"))
                .and(warp::body::bytes())
                .and_then({
                    let router = event_router.clone();
                    move |method: Method,
                          path: warp::path::FullPath,
                          params: HashMap<String, String>,
                          content_type: Option<String>,
                          body: bytes::Bytes| {
                        let router = router.clone();
                        async move {
                            let subscription_id = Self::subscription_id(path.as_str(), &params)
                                .ok_or_else(|| warp::reject::custom(MissingSubscriptionId))?;

                            if method == Method::GET {
                                let query = VerificationQuery::from_params(subscription_id, &params)
                                    .ok_or_else(|| warp::reject::custom(InvalidVerificationRequest))?;

                                tracing::debug!(
                                    subscription_id = %query.subscription_id,
                                    mode = %query.mode,
                                    "hub verification request"
                                );

                                match router.route_verification(query).await {
                                    VerificationReply::Confirmed(challenge) => {
                                        Ok::<_, warp::Rejection>(warp::reply::with_status(challenge, StatusCode::OK))
                                    }
                                    VerificationReply::Rejected => Err(warp::reject::not_found()),
                                    VerificationReply::Unavailable => Err(warp::reject::custom(HandlerUnavailable)),
                                }
                            } else if method == Method::POST {
                                tracing::debug!(
                                    subscription_id = %subscription_id,
                                    bytes = body.len(),
                                    "hub content notification"
                                );

                                if router.route_event(subscription_id, content_type, body).await {
                                    Ok(warp::reply::with_status(String::new(), StatusCode::OK))
                                } else {
                                    Err(warp::reject::not_found())
                                }
                            } else {
                                Err(warp::reject::custom(UnsupportedMethod))
                            }
                        }
                    }
                });

            let routes = callback_route.recover(handle_rejection);

            let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(
                SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
                async move {
                    shutdown_rx.recv().await;
                },
            );

            tracing::info!(%addr, "callback server listening");
            let _ = ready_tx.send(()).await;
            server.await;
        })
    }
}

/// The callback URL carried no subscription id.
#[derive(Debug)]
struct MissingSubscriptionId;

impl warp::reject::Reject for MissingSubscriptionId {}

/// A `GET` without `hub.mode` or `hub.challenge`.
#[derive(Debug)]
struct InvalidVerificationRequest;

impl warp::reject::Reject for InvalidVerificationRequest {}

/// The handler could not reach its subscription state.
#[derive(Debug)]
struct HandlerUnavailable;

impl warp::reject::Reject for HandlerUnavailable {}

#[derive(Debug)]
struct UnsupportedMethod;

impl warp::reject::Reject for UnsupportedMethod {}

/// Handle rejections and convert them to HTTP responses.
async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Subscription not found")
    } else if err.find::<MissingSubscriptionId>().is_some() {
        (StatusCode::NOT_FOUND, "Missing subscription id")
    } else if err.find::<InvalidVerificationRequest>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid verification request")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string")
    } else if err.find::<HandlerUnavailable>().is_some() {
        (StatusCode::SERVICE_UNAVAILABLE, "Subscription state unavailable")
    } else if err.find::<UnsupportedMethod>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        tracing::warn!(?err, "unhandled callback rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(warp::reply::with_status(message, code))
}
