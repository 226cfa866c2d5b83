use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::SubscriptionStore;
use crate::error::StorageError;
use crate::types::{Subscription, SubscriptionId};

/// In-memory store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    records: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn find(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StorageError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .insert(subscription.id.clone(), subscription.clone());
        Ok(())
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), StorageError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StorageError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
