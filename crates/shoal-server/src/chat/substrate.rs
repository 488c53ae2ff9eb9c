//! The key/value + pub/sub substrate behind the bus and the directory.
//!
//! Two primitives cover everything the relay needs from shared state:
//! fire-and-forget publish/subscribe on named channels, and set
//! add/remove/members keyed by string. The production implementation is
//! Redis (`redis_pubsub`); the in-memory one backs tests and single-node
//! development, including multi-engine tests that simulate a fleet inside
//! one process by sharing a single instance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("substrate channel closed")]
    Closed,
}

#[async_trait]
pub trait Substrate: Send + Sync {
    /// Publish a payload on a named channel. At-least-once, no ordering
    /// promise across publishers.
    async fn publish(&self, channel: &str, payload: String) -> Result<(), SubstrateError>;

    /// Subscribe to a named channel. Payloads arrive in substrate-delivery
    /// order; the feed ends when the receiver is dropped or the substrate
    /// shuts down.
    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, SubstrateError>;

    /// Add a member to the set at `key`, creating the set if absent.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), SubstrateError>;

    /// Remove a member from the set at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), SubstrateError>;

    /// Current members of the set at `key`; empty on a missing key.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError>;
}

/// Process-local substrate: broadcast channels for pub/sub, a locked map
/// of hash sets for the directory.
pub struct MemorySubstrate {
    sets: RwLock<HashMap<String, HashSet<String>>>,
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

const TOPIC_CAPACITY: usize = 256;
const FEED_CAPACITY: usize = 256;

impl MemorySubstrate {
    pub fn new() -> Self {
        MemorySubstrate { sets: RwLock::new(HashMap::new()), topics: RwLock::new(HashMap::new()) }
    }

    /// Shared handle, ready to hand to several engines at once.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    async fn topic(&self, channel: &str) -> broadcast::Sender<String> {
        let mut topics = self.topics.write().await;
        topics
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), SubstrateError> {
        // No subscribers is a successful no-op, as on the real substrate.
        let _ = self.topic(channel).await.send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<mpsc::Receiver<String>, SubstrateError> {
        let mut topic_rx = self.topic(channel).await.subscribe();
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        tokio::spawn(async move {
            loop {
                match topic_rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory substrate: subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), SubstrateError> {
        self.sets
            .write()
            .await
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), SubstrateError> {
        let mut sets = self.sets.write().await;
        if let Some(set) = sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        Ok(self
            .sets
            .read()
            .await
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
