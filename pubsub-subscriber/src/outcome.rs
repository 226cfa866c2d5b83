//! Per-hub results of batch operations.

use hub_client::{HubRequest, HubTransport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::types::SubscriptionId;

/// A hub accepted the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubAccepted {
    /// HTTP status returned by the hub
    pub status: u16,
    /// `true` when the hub answered `202 Accepted` and will verify later
    pub deferred: bool,
}

impl HubAccepted {
    pub fn from_status(status: u16) -> Self {
        Self {
            status,
            deferred: status == 202,
        }
    }
}

/// Result of one hub within a batch.
#[derive(Debug)]
pub struct HubOutcome {
    pub hub_url: String,
    /// Id of the affected record; `None` for publish notifications
    pub subscription_id: Option<SubscriptionId>,
    pub result: Result<HubAccepted, HubError>,
}

impl HubOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of a batch operation, one per hub in registration order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<HubOutcome>,
}

impl BatchReport {
    pub fn new(outcomes: Vec<HubOutcome>) -> Self {
        Self { outcomes }
    }

    /// True when every hub accepted. An empty report counts as success.
    pub fn is_all_success(&self) -> bool {
        self.outcomes.iter().all(HubOutcome::is_success)
    }

    pub fn successes(&self) -> impl Iterator<Item = &HubOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &HubOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Outcome for a given hub URL.
    pub fn get(&self, hub_url: &str) -> Option<&HubOutcome> {
        self.outcomes.iter().find(|o| o.hub_url == hub_url)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Send one request, bounded by `timeout` and `cancel`.
///
/// A token that is already cancelled wins over the send, so nothing goes
/// out. Any 2xx is an acceptance; everything else becomes a [`HubError`].
pub(crate) async fn send_to_hub(
    transport: &dyn HubTransport,
    request: &HubRequest,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<HubAccepted, HubError> {
    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(HubError::Cancelled),
        result = tokio::time::timeout(timeout, transport.send(request)) => match result {
            Err(_) => Err(HubError::Timeout(timeout)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(response)) if response.is_success() => Ok(HubAccepted::from_status(response.status)),
            Ok(Ok(response)) => Err(HubError::Rejected {
                status: response.status,
                body: response.body,
            }),
        },
    }
}
