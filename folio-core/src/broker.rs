//! Fan-out channels between the ingestion service and the consumers.
//!
//! A publish returns once the broker has accepted the message. Every active
//! subscriber of a channel receives each message at least once; there is no
//! ordering across channels. A subscriber acknowledges a [`Delivery`] once it is
//! done with it; a delivery dropped without an acknowledgement is redelivered
//! by brokers that persist offsets.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;

#[derive(thiserror::Error, Debug, Clone)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed for channel '{channel}': {reason}")]
    PublishFailed { channel: String, reason: String },

    #[error("Subscription failed for channel '{channel}': {reason}")]
    SubscriptionFailed { channel: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// A message as it travels through a channel. `key` is the order id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub channel: String,
    pub key: String,
    pub payload: String,
}

type AckFn = Box<dyn FnOnce() + Send>;

/// An envelope handed to a subscriber, together with its acknowledgement.
pub struct Delivery {
    pub envelope: Envelope,
    ack: Option<AckFn>,
}

impl Delivery {
    /// A delivery that needs no acknowledgement.
    pub fn new(envelope: Envelope) -> Self {
        Self { envelope, ack: None }
    }

    pub fn with_ack(envelope: Envelope, ack: impl FnOnce() + Send + 'static) -> Self {
        Self {
            envelope,
            ack: Some(Box::new(ack)),
        }
    }

    /// Marks the message as handled so the broker may move past it.
    pub fn ack(mut self) {
        if let Some(ack) = self.ack.take() {
            ack();
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .field("needs_ack", &self.ack.is_some())
            .finish()
    }
}

pub type EnvelopeStream = Pin<Box<dyn Stream<Item = Result<Delivery, BrokerError>> + Send>>;

#[async_trait]
pub trait EventBroker: Send + Sync {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BrokerError>;

    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, BrokerError>;
}

/// Names of the channels the pipeline uses.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChannelSet {
    pub inventory: String,
    pub dispatch: String,
    pub notification: String,
    pub dead_letter: String,
}

impl Default for ChannelSet {
    fn default() -> Self {
        Self {
            inventory: "orders.inventory".to_string(),
            dispatch: "orders.dispatch".to_string(),
            notification: "orders.notification".to_string(),
            dead_letter: "orders.dead-letter".to_string(),
        }
    }
}

impl ChannelSet {
    /// The three channels every new order is published to.
    pub fn fanout(&self) -> [&str; 3] {
        [
            self.inventory.as_str(),
            self.dispatch.as_str(),
            self.notification.as_str(),
        ]
    }
}

#[derive(Default)]
struct BrokerState {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Envelope>>>,
    published: Vec<Envelope>,
    failing: HashSet<String>,
    acked: HashMap<String, Arc<AtomicUsize>>,
}

/// Process-local broker. Keeps a log of accepted publishes so tests can use it
/// as a spy, and can be told to reject publishes on a given channel.
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_channel(&self, channel: &str) {
        self.state.lock().await.failing.insert(channel.to_string());
    }

    pub async fn heal_channel(&self, channel: &str) {
        self.state.lock().await.failing.remove(channel);
    }

    /// Messages accepted on `channel`, in publish order.
    pub async fn published(&self, channel: &str) -> Vec<Envelope> {
        self.state
            .lock()
            .await
            .published
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect()
    }

    pub async fn published_count(&self) -> usize {
        self.state.lock().await.published.len()
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .await
            .subscribers
            .get(channel)
            .map_or(0, |subscribers| subscribers.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Deliveries on `channel` that a subscriber acknowledged.
    pub async fn acked_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .await
            .acked
            .get(channel)
            .map_or(0, |acked| acked.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        if state.failing.contains(channel) {
            return Err(BrokerError::PublishFailed {
                channel: channel.to_string(),
                reason: "channel rejected the message".to_string(),
            });
        }

        let envelope = Envelope {
            channel: channel.to_string(),
            key: key.to_string(),
            payload: payload.to_string(),
        };

        if let Some(subscribers) = state.subscribers.get_mut(channel) {
            // Drop subscribers whose stream has been dropped.
            subscribers.retain(|tx| tx.send(envelope.clone()).is_ok());
        }
        state.published.push(envelope);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, BrokerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let acked = {
            let mut state = self.state.lock().await;
            state.subscribers.entry(channel.to_string()).or_default().push(tx);
            state.acked.entry(channel.to_string()).or_default().clone()
        };

        Ok(Box::pin(UnboundedReceiverStream::new(rx).map(move |envelope| {
            let acked = acked.clone();
            Ok(Delivery::with_ack(envelope, move || {
                acked.fetch_add(1, Ordering::SeqCst);
            }))
        })))
    }
}
