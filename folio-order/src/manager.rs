use crate::models::{Delivery, DeliveryOutcome, Order};
use crate::repository::OrderRepository;
use async_trait::async_trait;
use folio_core::StoreError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Order store kept in process memory, for tests and single-node runs.
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    unavailable: AtomicBool,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: every call fails with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("order store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        self.check_available()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::Conflict(order.order_id.to_string()));
        }
        orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn record_delivery(
        &self,
        order_id: Uuid,
        delivery: &Delivery,
    ) -> Result<DeliveryOutcome, StoreError> {
        self.check_available()?;
        // Check and write under one lock guard.
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", order_id)))?;

        if let Some(existing) = order.deliveries.first() {
            return Ok(DeliveryOutcome::AlreadyRecorded(existing.tracking_number.clone()));
        }

        order.deliveries = vec![delivery.clone()];
        Ok(DeliveryOutcome::Recorded)
    }
}
