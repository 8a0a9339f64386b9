//! Topic-addressed pub/sub seam consumed by the service layer.
//!
//! Topic strings handed to a [`Bus`] are already wire names; this crate never
//! interprets or rewrites them.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

pub const DEFAULT_TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Broadcast medium: every subscriber of a topic observes every message
/// published on it, with no notion of an intended recipient.
pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;

    /// Returns how many subscribers the message reached. Zero is not an error.
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<usize>;
}

/// In-process bus for tests and single-process wiring.
#[derive(Debug)]
pub struct LocalBus {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-topic queue depth before slow subscribers start lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let capacity = self.capacity;
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<usize> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        // broadcast::Sender only fails when nobody is subscribed.
        Ok(self.sender_for(topic).send(message).unwrap_or(0))
    }
}
