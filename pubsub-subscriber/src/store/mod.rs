//! Subscription persistence.
//!
//! The subscriber only talks to storage through [`SubscriptionStore`].
//! Two implementations ship with the crate: [`MemorySubscriptionStore`] for
//! tests and short-lived processes, and [`JsonFileSubscriptionStore`] which
//! survives restarts.

mod file;
mod memory;

pub use file::JsonFileSubscriptionStore;
pub use memory::MemorySubscriptionStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Subscription, SubscriptionId};

/// Persistence contract for subscription records.
///
/// Every operation must be atomic with respect to a single record: a
/// concurrent reader sees either the previous or the new version, never a
/// partial write.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Look up a record by id.
    async fn find(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StorageError>;

    /// Insert or replace a record. Saving the same record twice is a no-op.
    async fn save(&self, subscription: &Subscription) -> Result<(), StorageError>;

    /// Remove a record. Deleting a missing record is not an error.
    async fn delete(&self, id: &SubscriptionId) -> Result<(), StorageError>;

    /// All records, in no particular order.
    async fn list(&self) -> Result<Vec<Subscription>, StorageError>;
}
