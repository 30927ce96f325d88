//! The set of live subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use hive_core::SubscriberId;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::SubscribeError;
use crate::subscriber::Subscriber;

/// Registered subscribers indexed by id.
///
/// Broadcasts work on a [`snapshot`](Self::snapshot), so joins and leaves
/// never wait on delivery.
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Arc<Subscriber>>>,
    capacity: usize,
}

impl SubscriberRegistry {
    /// Create a registry holding at most `capacity` subscribers.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Add a subscriber.
    pub async fn register(&self, subscriber: Arc<Subscriber>) -> Result<(), SubscribeError> {
        let mut subs = self.subscribers.write().await;
        if subs.len() >= self.capacity {
            return Err(SubscribeError::AtCapacity {
                limit: self.capacity,
            });
        }
        let id = subscriber.id().clone();
        debug!(subscriber_id = %id, "subscriber registered");
        let _ = subs.insert(id, subscriber);
        Ok(())
    }

    /// Remove a subscriber by id. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: &SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(id).is_some();
        if removed {
            debug!(subscriber_id = %id, "subscriber unregistered");
        }
        removed
    }

    /// Clone the current membership. The lock is released on return.
    pub async fn snapshot(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers.read().await.values().cloned().collect()
    }

    /// Look up one subscriber.
    pub async fn get(&self, id: &SubscriberId) -> Option<Arc<Subscriber>> {
        self.subscribers.read().await.get(id).cloned()
    }

    /// Number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Whether no subscriber is registered.
    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }

    /// Remove everyone, returning the removed subscribers.
    pub async fn drain(&self) -> Vec<Arc<Subscriber>> {
        self.subscribers
            .write()
            .await
            .drain()
            .map(|(_, sub)| sub)
            .collect()
    }

    /// Hold the registry exclusively, stalling joins, leaves and broadcasts.
    #[cfg(test)]
    pub(crate) async fn lock_exclusive(
        &self,
    ) -> tokio::sync::RwLockWriteGuard<'_, HashMap<SubscriberId, Arc<Subscriber>>> {
        self.subscribers.write().await
    }
}
