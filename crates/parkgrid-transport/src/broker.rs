//! In-process pub/sub broker on a tokio broadcast channel.
//!
//! Every subscription sees every message and filters locally, which is
//! fine at the fleet sizes this runs with. Slow subscribers lose the
//! oldest messages (logged) instead of back-pressuring publishers.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::Transport;
use crate::error::TransportError;
use crate::topics::{is_valid_filter, topic_matches};

const DEFAULT_CAPACITY: usize = 1024;

/// A published payload.
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub payload: Arc<[u8]>,
}

impl Message {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[derive(Clone)]
pub struct Broker {
    tx: broadcast::Sender<Message>,
}

impl Broker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to topics matching `filter` (`+` and `#` wildcards).
    pub fn subscribe(&self, filter: &str) -> Result<Subscription, TransportError> {
        if !is_valid_filter(filter) {
            return Err(TransportError::InvalidTopic(filter.to_string()));
        }
        debug!(%filter, "subscribed");
        Ok(Subscription {
            filter: filter.to_string(),
            rx: self.tx.subscribe(),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for Broker {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(TransportError::InvalidTopic(topic.to_string()));
        }
        let message = Message {
            topic: topic.to_string(),
            payload: payload.into(),
        };
        // No subscribers is not an error: the message is simply dropped.
        let _ = self.tx.send(message);
        Ok(())
    }
}

/// Receiving end of a filtered subscription.
pub struct Subscription {
    filter: String,
    rx: broadcast::Receiver<Message>,
}

impl Subscription {
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Next message matching the filter; `None` once the broker is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.recv().await {
                Ok(message) if topic_matches(&self.filter, &message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(filter = %self.filter, skipped, "subscriber lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Message> {
        loop {
            match self.rx.try_recv() {
                Ok(message) if topic_matches(&self.filter, &message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(filter = %self.filter, skipped, "subscriber lagged, messages dropped");
                }
                Err(_) => return None,
            }
        }
    }
}
