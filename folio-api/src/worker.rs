//! Long-lived consumer loops, one per channel.
//!
//! Each loop subscribes, hands every event to its handler one at a time, and
//! dead-letters what the handler rejects or what cannot be decoded. An event is
//! acknowledged once it was handled or dead-lettered; anything else is left for
//! the broker to redeliver. When the stream ends the loop waits and subscribes
//! again. A shutdown signal stops the loop between events; the in-flight event
//! is always finished.

use chrono::Utc;
use folio_core::{ChannelSet, Delivery, Envelope, EventBroker, EventHandler, FolioError, FolioResult, HandleOutcome};
use folio_shared::{DeadLetterEvent, OrderEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub struct ConsumerWorker {
    channel: String,
    dead_letter_channel: String,
    handler: Arc<dyn EventHandler>,
    broker: Arc<dyn EventBroker>,
    reconnect_delay: Duration,
}

impl ConsumerWorker {
    pub fn new(
        channel: impl Into<String>,
        dead_letter_channel: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        broker: Arc<dyn EventBroker>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            channel: channel.into(),
            dead_letter_channel: dead_letter_channel.into(),
            handler,
            broker,
            reconnect_delay,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("{} consumer started on {}", self.handler.name(), self.channel);

        loop {
            let subscription = tokio::select! {
                _ = shutdown.recv() => break,
                subscription = self.broker.subscribe(&self.channel) => subscription,
            };

            match subscription {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = shutdown.recv() => {
                            info!("{} consumer on {} shutting down", self.handler.name(), self.channel);
                            return;
                        }
                        next = stream.next() => match next {
                            Some(Ok(delivery)) => self.consume(delivery).await,
                            Some(Err(e)) => warn!("Error receiving from {}: {}", self.channel, e),
                            None => {
                                warn!("Subscription to {} ended, reconnecting", self.channel);
                                break;
                            }
                        }
                    }
                },
                Err(e) => error!("Failed to subscribe to {}: {}", self.channel, e),
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!("{} consumer on {} shutting down", self.handler.name(), self.channel);
    }

    /// Processes one delivery and acknowledges it when it is settled.
    pub async fn consume(&self, delivery: Delivery) {
        let (_, settled) = self.settle(&delivery.envelope).await;
        if settled {
            delivery.ack();
        } else {
            warn!(
                "Message {} on {} was neither handled nor dead-lettered, leaving it for redelivery",
                delivery.envelope.key, self.channel
            );
        }
    }

    /// Handles one delivered message. Failures are dead-lettered before returning.
    pub async fn process(&self, envelope: &Envelope) -> FolioResult<HandleOutcome> {
        self.settle(envelope).await.0
    }

    /// The handler's result, and whether the message is done with: handled, or
    /// parked on the dead-letter channel.
    async fn settle(&self, envelope: &Envelope) -> (FolioResult<HandleOutcome>, bool) {
        let event = match OrderEvent::from_json(&envelope.payload) {
            Ok(event) => event,
            Err(e) => {
                error!("Undecodable payload on {} (key {}): {}", self.channel, envelope.key, e);
                let order_id = Uuid::parse_str(&envelope.key).ok();
                let parked = self.dead_letter(envelope, order_id, &e.to_string()).await;
                return (Err(FolioError::SerializationError(e)), parked);
            }
        };

        match self.handler.handle(&event).await {
            Ok(outcome) => {
                debug!("{} handled order {}: {:?}", self.handler.name(), event.order_id, outcome);
                (Ok(outcome), true)
            }
            Err(e) => {
                error!("{} failed on order {}: {}", self.handler.name(), event.order_id, e);
                let parked = self.dead_letter(envelope, Some(event.order_id), &e.to_string()).await;
                (Err(e), parked)
            }
        }
    }

    async fn dead_letter(&self, envelope: &Envelope, order_id: Option<Uuid>, reason: &str) -> bool {
        let record = DeadLetterEvent {
            consumer: self.handler.name().to_string(),
            channel: self.channel.clone(),
            order_id,
            reason: reason.to_string(),
            payload: envelope.payload.clone(),
            failed_at: Utc::now(),
        };

        let payload = match serde_json::to_string(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not encode dead-letter record: {}", e);
                return false;
            }
        };

        let key = order_id.map(|id| id.to_string()).unwrap_or_else(|| envelope.key.clone());
        match self.broker.publish(&self.dead_letter_channel, &key, &payload).await {
            Ok(()) => {
                warn!("Dead-lettered message {} from {}", key, self.channel);
                true
            }
            Err(e) => {
                error!("Failed to dead-letter message {} from {}: {}", key, self.channel, e);
                false
            }
        }
    }
}

/// The handler behind each fan-out channel.
pub struct Consumers {
    pub inventory: Arc<dyn EventHandler>,
    pub dispatch: Arc<dyn EventHandler>,
    pub notification: Arc<dyn EventHandler>,
}

/// Spawns one worker per fan-out channel, each listening on `shutdown`.
pub fn spawn_consumers(
    broker: Arc<dyn EventBroker>,
    channels: &ChannelSet,
    consumers: Consumers,
    reconnect_delay: Duration,
    shutdown: &broadcast::Sender<()>,
) -> Vec<JoinHandle<()>> {
    [
        (&channels.inventory, consumers.inventory),
        (&channels.dispatch, consumers.dispatch),
        (&channels.notification, consumers.notification),
    ]
    .into_iter()
    .map(|(channel, handler)| {
        let worker = ConsumerWorker::new(
            channel.clone(),
            channels.dead_letter.clone(),
            handler,
            broker.clone(),
            reconnect_delay,
        );
        tokio::spawn(worker.run(shutdown.subscribe()))
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_core::InMemoryBroker;
    use folio_shared::{Customer, LineItem};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fails on every order whose first item is titled "poison".
    struct CountingHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        async fn handle(&self, event: &OrderEvent) -> FolioResult<HandleOutcome> {
            if event.line_items.first().map(|i| i.title.as_str()) == Some("poison") {
                return Err(FolioError::consumer("counting", event.order_id, "poison item"));
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(HandleOutcome::Applied)
        }
    }

    fn envelope(title: &str) -> Envelope {
        let event = OrderEvent {
            order_id: Uuid::new_v4(),
            line_items: vec![LineItem::new(title, 1, 1.0)],
            customer: Customer::default(),
            created_at: Utc::now(),
        };
        Envelope {
            channel: "orders.test".to_string(),
            key: event.order_id.to_string(),
            payload: event.to_json().unwrap(),
        }
    }

    fn worker(broker: Arc<InMemoryBroker>, handler: Arc<CountingHandler>) -> ConsumerWorker {
        ConsumerWorker::new("orders.test", "orders.dead-letter", handler, broker, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_handler_failure_is_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let worker = worker(broker.clone(), handler.clone());

        let poison = envelope("poison");
        assert!(worker.process(&poison).await.is_err());
        assert!(worker.process(&envelope("Book A")).await.is_ok());

        let dead = broker.published("orders.dead-letter").await;
        assert_eq!(dead.len(), 1);
        let record: DeadLetterEvent = serde_json::from_str(&dead[0].payload).unwrap();
        assert_eq!(record.consumer, "counting");
        assert_eq!(record.payload, poison.payload);
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let worker = worker(broker.clone(), handler.clone());

        let garbage = Envelope {
            channel: "orders.test".to_string(),
            key: "not-a-uuid".to_string(),
            payload: "{not json".to_string(),
        };

        let result = worker.process(&garbage).await;
        assert!(matches!(result, Err(FolioError::SerializationError(_))));

        let dead = broker.published("orders.dead-letter").await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].key, "not-a-uuid");
        assert_eq!(handler.handled.load(Ordering::SeqCst), 0);
    }

    fn tracked(envelope: Envelope) -> (Delivery, Arc<AtomicBool>) {
        let acked = Arc::new(AtomicBool::new(false));
        let flag = acked.clone();
        let delivery = Delivery::with_ack(envelope, move || flag.store(true, Ordering::SeqCst));
        (delivery, acked)
    }

    #[tokio::test]
    async fn test_handled_and_dead_lettered_messages_are_acknowledged() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let worker = worker(broker.clone(), handler.clone());

        let (good, good_acked) = tracked(envelope("Book A"));
        let (poison, poison_acked) = tracked(envelope("poison"));
        worker.consume(good).await;
        worker.consume(poison).await;

        assert!(good_acked.load(Ordering::SeqCst));
        assert!(poison_acked.load(Ordering::SeqCst));
        assert_eq!(broker.published("orders.dead-letter").await.len(), 1);
    }

    #[tokio::test]
    async fn test_message_is_not_acknowledged_when_dead_letter_fails() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.fail_channel("orders.dead-letter").await;
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let worker = worker(broker.clone(), handler);

        let (poison, acked) = tracked(envelope("poison"));
        worker.consume(poison).await;

        assert!(!acked.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_running_loop_acknowledges_each_message() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(worker(broker.clone(), handler.clone()).run(shutdown_rx));

        while broker.subscriber_count("orders.test").await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        for title in ["Book A", "poison", "Book B"] {
            let message = envelope(title);
            broker.publish("orders.test", &message.key, &message.payload).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            while broker.acked_count("orders.test").await < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handler.handled.load(Ordering::SeqCst), 2);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_loop_exits_on_shutdown() {
        let broker = Arc::new(InMemoryBroker::new());
        let handler = Arc::new(CountingHandler { handled: AtomicUsize::new(0) });
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(worker(broker, handler).run(shutdown_rx));
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
