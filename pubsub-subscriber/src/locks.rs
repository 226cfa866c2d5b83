//! Per-record write serialization.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::SubscriptionId;

/// One async mutex per subscription id.
///
/// Shared by the engine and the verification handler so that a record is
/// only ever read-modified-written by one task at a time. Never hold a
/// guard across a hub request: a synchronous hub verifies while the
/// request is still open.
#[derive(Debug, Clone, Default)]
pub struct RecordLocks {
    inner: Arc<DashMap<SubscriptionId, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a record.
    pub async fn lock(&self, id: &SubscriptionId) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the mutex of a deleted record if nobody holds it.
    pub fn forget(&self, id: &SubscriptionId) {
        // One reference lives in the map; more means someone is waiting
        self.inner.remove_if(id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
