use crate::models::{Delivery, DeliveryOutcome, ShippingAddress, ShippingMethod, TrackingNumber};
use crate::repository::OrderRepository;
use async_trait::async_trait;
use chrono::Utc;
use folio_core::{EventHandler, FolioError, FolioResult, HandleOutcome, StoreError};
use folio_shared::OrderEvent;
use std::sync::Arc;
use tracing::{info, warn};

pub const CONSUMER_NAME: &str = "dispatch";

/// Picks the carrier for an order.
pub trait ShippingPolicy: Send + Sync {
    fn choose(&self, event: &OrderEvent) -> ShippingMethod;
}

/// Same carrier for every order.
pub struct FixedShipping(pub ShippingMethod);

impl ShippingPolicy for FixedShipping {
    fn choose(&self, _event: &OrderEvent) -> ShippingMethod {
        self.0
    }
}

/// Assigns a delivery to each new order and records it on the order, once.
pub struct DispatchHandler {
    orders: Arc<dyn OrderRepository>,
    policy: Arc<dyn ShippingPolicy>,
}

impl DispatchHandler {
    pub fn new(orders: Arc<dyn OrderRepository>, policy: Arc<dyn ShippingPolicy>) -> Self {
        Self { orders, policy }
    }

    pub fn assign(&self, event: &OrderEvent) -> Delivery {
        Delivery {
            shipping_address: ShippingAddress::from(&event.customer),
            shipping_method: self.policy.choose(event),
            tracking_number: TrackingNumber::generate(),
            assigned_at: Utc::now(),
        }
    }
}

#[async_trait]
impl EventHandler for DispatchHandler {
    fn name(&self) -> &str {
        CONSUMER_NAME
    }

    async fn handle(&self, event: &OrderEvent) -> FolioResult<HandleOutcome> {
        let delivery = self.assign(event);

        match self.orders.record_delivery(event.order_id, &delivery).await {
            Ok(DeliveryOutcome::Recorded) => {
                info!(
                    "Order {} dispatched via {} with tracking number {}",
                    event.order_id, delivery.shipping_method, delivery.tracking_number
                );
                Ok(HandleOutcome::Applied)
            }
            Ok(DeliveryOutcome::AlreadyRecorded(existing)) => {
                info!(
                    "Order {} already dispatched (tracking {}), ignoring redelivery",
                    event.order_id, existing
                );
                Ok(HandleOutcome::Duplicate)
            }
            Err(StoreError::NotFound(_)) => {
                warn!("Dispatch event for order {} but the order is not in the store", event.order_id);
                Err(FolioError::consumer(CONSUMER_NAME, event.order_id, "order not found in store"))
            }
            Err(e) => Err(FolioError::consumer(CONSUMER_NAME, event.order_id, e.to_string())),
        }
    }
}
