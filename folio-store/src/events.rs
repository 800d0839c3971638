use async_trait::async_trait;
use folio_core::{BrokerError, Delivery, Envelope, EnvelopeStream, EventBroker};
use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Kafka broker: topic per channel, order id as message key.
#[derive(Clone)]
pub struct KafkaBroker {
    producer: FutureProducer,
    brokers: String,
    group_prefix: String,
}

impl KafkaBroker {
    pub fn new(brokers: &str, group_prefix: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            producer,
            brokers: brokers.to_string(),
            group_prefix: group_prefix.to_string(),
        })
    }

    pub fn consumer_group(&self, channel: &str) -> String {
        format!("{}.{}", self.group_prefix, channel)
    }
}

#[async_trait]
impl EventBroker for KafkaBroker {
    async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BrokerError> {
        let record = FutureRecord::to(channel)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(
                    "Sent message to {}/{}: partition {} offset {}",
                    channel, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", channel, e);
                Err(BrokerError::PublishFailed {
                    channel: channel.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, BrokerError> {
        let group_id = self.consumer_group(channel);
        let subscription_failed = |reason: String| BrokerError::SubscriptionFailed {
            channel: channel.to_string(),
            reason,
        };

        // Offsets are committed only after the worker acknowledged the event.
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| subscription_failed(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[channel])
            .map_err(|e| subscription_failed(format!("Failed to subscribe: {}", e)))?;

        info!("Subscribed to {} as consumer group {}", channel, group_id);

        let (tx, mut rx) = mpsc::channel::<Result<Delivery, BrokerError>>(1);
        let topic = channel.to_string();

        tokio::spawn(async move {
            let mut messages = consumer.stream();

            while let Some(received) = messages.next().await {
                let message = match received {
                    Ok(message) => message,
                    Err(e) => {
                        if tx.send(Err(BrokerError::Transport(e.to_string()))).await.is_err() {
                            break;
                        }
                        continue;
                    }
                };

                let envelope = Envelope {
                    channel: topic.clone(),
                    key: message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned())
                        .unwrap_or_default(),
                    payload: message
                        .payload()
                        .map(|p| String::from_utf8_lossy(p).into_owned())
                        .unwrap_or_default(),
                };

                let (ack_tx, ack_rx) = oneshot::channel();
                let delivery = Delivery::with_ack(envelope, move || {
                    let _ = ack_tx.send(());
                });

                if tx.send(Ok(delivery)).await.is_err() {
                    debug!("Subscriber for {} dropped, exiting consumer task", topic);
                    break;
                }

                // Dropped unacknowledged: leave the offset so the group redelivers it.
                if ack_rx.await.is_err() {
                    info!(
                        "Offset {} on {} released without acknowledgement, leaving it uncommitted",
                        message.offset(),
                        topic
                    );
                    break;
                }

                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                    warn!(
                        "Failed to commit offset {} on {} (message may be redelivered): {}",
                        message.offset(),
                        topic,
                        e
                    );
                }
            }

            debug!("Consumer task for {} exiting", topic);
        });

        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_broker_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KafkaBroker>();
    }
}
