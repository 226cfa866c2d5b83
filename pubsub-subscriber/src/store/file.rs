use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::SubscriptionStore;
use crate::error::StorageError;
use crate::types::{Subscription, SubscriptionId};

/// Store keeping every record in one JSON file.
///
/// Writes go to a sibling temp file which is then renamed over the
/// original, so a crash leaves either the old or the new file. All
/// operations are serialized through one mutex.
#[derive(Debug)]
pub struct JsonFileSubscriptionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileSubscriptionStore {
    /// Open a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<SubscriptionId, Subscription>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, records: &BTreeMap<SubscriptionId, Subscription>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(records)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(path = %self.path.display(), records = records.len(), "subscription file written");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for JsonFileSubscriptionStore {
    async fn find(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(id))
    }

    async fn save(&self, subscription: &Subscription) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        records.insert(subscription.id.clone(), subscription.clone());
        self.write_all(&records).await
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_all().await?;
        if records.remove(id).is_some() {
            self.write_all(&records).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Subscription>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.into_values().collect())
    }
}
