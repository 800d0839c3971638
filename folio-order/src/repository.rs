use async_trait::async_trait;
use folio_core::StoreError;
use uuid::Uuid;
use crate::models::{Delivery, DeliveryOutcome, Order};

/// The order store: sole source of truth for order existence and content.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Single insert keyed by `order_id`. A duplicate id is a `Conflict`.
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Sets `deliveries` to `[delivery]` only while the order has none, as one
    /// atomic update of that field. Unknown orders are `NotFound`.
    async fn record_delivery(
        &self,
        order_id: Uuid,
        delivery: &Delivery,
    ) -> Result<DeliveryOutcome, StoreError>;
}
