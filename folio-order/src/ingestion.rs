//! `CreateOrder`: validate, store once, then fan out to every downstream channel.
//!
//! The store write gates the fan-out. If it fails nothing is published and the
//! caller gets the error. Once it succeeds the order exists, so publish
//! failures are logged and reported in the receipt but never fail the call.

use crate::models::Order;
use crate::repository::OrderRepository;
use folio_core::{with_deadline, ChannelSet, EventBroker, FolioError, FolioResult};
use folio_shared::{Customer, LineItem};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(rename = "products")]
    pub line_items: Vec<LineItem>,
    pub customer: Customer,
}

#[derive(Debug, Clone)]
pub struct IngestionTimeouts {
    pub store_write: Duration,
    pub publish: Duration,
}

impl Default for IngestionTimeouts {
    fn default() -> Self {
        Self {
            store_write: Duration::from_secs(3),
            publish: Duration::from_secs(5),
        }
    }
}

/// What `create_order` hands back. Only `order_id` is part of the public contract.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order_id: Uuid,
    pub failed_channels: Vec<String>,
}

impl OrderReceipt {
    pub fn fully_published(&self) -> bool {
        self.failed_channels.is_empty()
    }
}

pub struct OrderIngestionService {
    orders: Arc<dyn OrderRepository>,
    broker: Arc<dyn EventBroker>,
    channels: ChannelSet,
    timeouts: IngestionTimeouts,
}

impl OrderIngestionService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        broker: Arc<dyn EventBroker>,
        channels: ChannelSet,
        timeouts: IngestionTimeouts,
    ) -> Self {
        Self { orders, broker, channels, timeouts }
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> FolioResult<OrderReceipt> {
        validate(&request)?;

        let order = Order::new(request.line_items, request.customer);
        let order_id = order.order_id;

        with_deadline("order store write", self.timeouts.store_write, self.orders.insert_order(&order))
            .await
            .map_err(|e| {
                error!("Failed to store order {}: {}", order_id, e);
                e
            })?;

        info!(
            "Order {} stored: {} line items, total {:.2}, customer {}",
            order_id,
            order.line_items.len(),
            order.total(),
            order.customer.email
        );

        let failed_channels = match order.to_event().to_json() {
            Ok(payload) => self.fan_out(order_id, &payload).await,
            Err(e) => {
                error!("Could not encode event for order {}: {}", order_id, e);
                self.channels.fanout().iter().map(|c| c.to_string()).collect()
            }
        };

        if !failed_channels.is_empty() {
            warn!(
                "Order {} stored but not published to {:?}; downstream processing for those channels will not happen",
                order_id, failed_channels
            );
        }

        Ok(OrderReceipt { order_id, failed_channels })
    }

    /// Publishes to the three channels concurrently; returns the channels that failed.
    async fn fan_out(&self, order_id: Uuid, payload: &str) -> Vec<String> {
        let key = order_id.to_string();
        let publishes = self.channels.fanout().into_iter().map(|channel| {
            let key = key.as_str();
            async move {
                let operation = format!("publish to {}", channel);
                let result = with_deadline(&operation, self.timeouts.publish, self.broker.publish(channel, key, payload)).await;
                (channel, result)
            }
        });

        let mut failed = Vec::new();
        for (channel, result) in join_all(publishes).await {
            match result {
                Ok(()) => info!("Order {} published to {}", order_id, channel),
                Err(e) => {
                    error!("Order {} not published to {}: {}", order_id, channel, e);
                    failed.push(channel.to_string());
                }
            }
        }
        failed
    }
}

/// Rejects requests that must never reach the store.
pub fn validate(request: &CreateOrderRequest) -> FolioResult<()> {
    if request.line_items.is_empty() {
        return Err(FolioError::ValidationError("order must contain at least one line item".to_string()));
    }

    for (index, item) in request.line_items.iter().enumerate() {
        if item.title.trim().is_empty() {
            return Err(FolioError::ValidationError(format!("line item {} has no title", index)));
        }
        if item.quantity == 0 {
            return Err(FolioError::ValidationError(format!(
                "line item {} ('{}') must have quantity > 0",
                index, item.title
            )));
        }
        if !item.unit_price.is_finite() || item.unit_price < 0.0 {
            return Err(FolioError::ValidationError(format!(
                "line item {} ('{}') has invalid price {}",
                index, item.title, item.unit_price
            )));
        }
    }

    if request.customer.name.trim().is_empty() {
        return Err(FolioError::ValidationError("customer name is required".to_string()));
    }
    if request.customer.email.is_blank() {
        return Err(FolioError::ValidationError("customer email is required".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::InMemoryOrderRepository;
    use async_trait::async_trait;
    use folio_core::{BrokerError, EnvelopeStream, InMemoryBroker};
    use folio_shared::{Masked, OrderEvent};

    /// Accepts publishes on `stalled` only after `delay`.
    struct StallingBroker {
        inner: InMemoryBroker,
        stalled: String,
        delay: Duration,
    }

    #[async_trait]
    impl EventBroker for StallingBroker {
        async fn publish(&self, channel: &str, key: &str, payload: &str) -> Result<(), BrokerError> {
            if channel == self.stalled {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.publish(channel, key, payload).await
        }

        async fn subscribe(&self, channel: &str) -> Result<EnvelopeStream, BrokerError> {
            self.inner.subscribe(channel).await
        }
    }

    fn request() -> CreateOrderRequest {
        CreateOrderRequest {
            line_items: vec![LineItem::new("Book A", 2, 10.0), LineItem::new("Book B", 1, 5.0)],
            customer: Customer {
                name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                email: Masked::new("jane@example.com".to_string()),
                ..Customer::default()
            },
        }
    }

    fn service(
        orders: Arc<InMemoryOrderRepository>,
        broker: Arc<InMemoryBroker>,
    ) -> OrderIngestionService {
        OrderIngestionService::new(orders, broker, ChannelSet::default(), IngestionTimeouts::default())
    }

    #[tokio::test]
    async fn test_created_order_matches_input_and_is_published_everywhere() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let svc = service(orders.clone(), broker.clone());

        let receipt = svc.create_order(request()).await.unwrap();
        assert!(receipt.fully_published());

        let stored = orders.get_order(receipt.order_id).await.unwrap().unwrap();
        assert_eq!(stored.line_items, request().line_items);
        assert_eq!(stored.customer, request().customer);
        assert!(stored.deliveries.is_empty());

        for channel in ChannelSet::default().fanout() {
            let published = broker.published(channel).await;
            assert_eq!(published.len(), 1, "channel {}", channel);
            assert_eq!(published[0].key, receipt.order_id.to_string());

            let event = OrderEvent::from_json(&published[0].payload).unwrap();
            assert_eq!(event, stored.to_event());
        }
    }

    #[tokio::test]
    async fn test_order_ids_are_unique() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let svc = service(orders.clone(), Arc::new(InMemoryBroker::new()));

        let a = svc.create_order(request()).await.unwrap();
        let b = svc.create_order(request()).await.unwrap();

        assert_ne!(a.order_id, b.order_id);
        assert_eq!(orders.order_count().await, 2);
    }

    #[tokio::test]
    async fn test_store_failure_publishes_nothing() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        orders.set_unavailable(true);

        let result = service(orders, broker.clone()).create_order(request()).await;

        assert!(matches!(result, Err(FolioError::StorageError(_))));
        assert_eq!(broker.published_count().await, 0);
    }

    #[tokio::test]
    async fn test_one_failed_channel_does_not_fail_the_call() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let channels = ChannelSet::default();
        broker.fail_channel(&channels.dispatch).await;

        let receipt = service(orders.clone(), broker.clone()).create_order(request()).await.unwrap();

        assert_eq!(receipt.failed_channels, vec![channels.dispatch.clone()]);
        assert!(orders.get_order(receipt.order_id).await.unwrap().is_some());
        assert_eq!(broker.published(&channels.inventory).await.len(), 1);
        assert_eq!(broker.published(&channels.notification).await.len(), 1);
        assert!(broker.published(&channels.dispatch).await.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_publish_times_out_without_failing_the_call() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let channels = ChannelSet::default();
        let broker = Arc::new(StallingBroker {
            inner: InMemoryBroker::new(),
            stalled: channels.notification.clone(),
            delay: Duration::from_secs(5),
        });
        let timeouts = IngestionTimeouts {
            store_write: Duration::from_secs(1),
            publish: Duration::from_millis(50),
        };
        let svc = OrderIngestionService::new(orders.clone(), broker.clone(), channels.clone(), timeouts);

        let receipt = tokio::time::timeout(Duration::from_secs(1), svc.create_order(request()))
            .await
            .expect("publish timeout must bound the call")
            .unwrap();

        assert_eq!(receipt.failed_channels, vec![channels.notification.clone()]);
        assert!(orders.get_order(receipt.order_id).await.unwrap().is_some());
        assert_eq!(broker.inner.published(&channels.inventory).await.len(), 1);
        assert_eq!(broker.inner.published(&channels.dispatch).await.len(), 1);
        assert!(broker.inner.published(&channels.notification).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_store() {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let broker = Arc::new(InMemoryBroker::new());
        let svc = service(orders.clone(), broker.clone());

        let mut empty = request();
        empty.line_items.clear();

        let mut zero_quantity = request();
        zero_quantity.line_items[1].quantity = 0;

        let mut negative_price = request();
        negative_price.line_items[0].unit_price = -1.0;

        let mut no_email = request();
        no_email.customer.email = Masked::new(String::new());

        for bad in [empty, zero_quantity, negative_price, no_email] {
            let result = svc.create_order(bad).await;
            assert!(matches!(result, Err(FolioError::ValidationError(_))));
        }

        assert_eq!(orders.order_count().await, 0);
        assert_eq!(broker.published_count().await, 0);
    }
}
