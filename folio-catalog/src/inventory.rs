use async_trait::async_trait;
use folio_core::{EventHandler, FolioError, FolioResult, HandleOutcome, StoreError};
use folio_shared::{LineItem, OrderEvent};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CONSUMER_NAME: &str = "inventory";

/// Current stock of one product, as returned by lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub title: String,
    pub quantity_on_hand: i64,
}

/// Result of one `(order, product)` decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecrementOutcome {
    /// Stock was decremented; carries the new quantity on hand.
    Applied(i64),
    /// This order already decremented this product.
    Duplicate,
    UnknownProduct,
}

/// Stock keyed by product title.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Decrements `title` by `quantity` at most once per `(order_id, title)`.
    /// The dedup marker and the decrement are written atomically.
    async fn decrement_once(
        &self,
        order_id: Uuid,
        title: &str,
        quantity: u32,
    ) -> Result<DecrementOutcome, StoreError>;

    async fn quantity_on_hand(&self, title: &str) -> Result<Option<i64>, StoreError>;

    /// Creates the stock record unless one exists. Returns `true` when created.
    async fn stock_if_absent(&self, title: &str, quantity: i64) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Inventory store error for '{title}': {source}")]
    Store {
        title: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Default)]
struct InventoryState {
    stock: HashMap<String, i64>,
    applied: HashSet<(Uuid, String)>,
}

/// Inventory kept in process memory. Marker and decrement share one lock.
#[derive(Default)]
pub struct InMemoryInventory {
    state: Mutex<InventoryState>,
    unavailable: AtomicBool,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_stock(items: &[(&str, i64)]) -> Self {
        let inventory = Self::new();
        {
            let mut state = inventory.state.lock().await;
            for (title, quantity) in items {
                state.stock.insert(title.to_string(), *quantity);
            }
        }
        inventory
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("inventory store is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventory {
    async fn decrement_once(
        &self,
        order_id: Uuid,
        title: &str,
        quantity: u32,
    ) -> Result<DecrementOutcome, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        if !state.stock.contains_key(title) {
            return Ok(DecrementOutcome::UnknownProduct);
        }
        if !state.applied.insert((order_id, title.to_string())) {
            return Ok(DecrementOutcome::Duplicate);
        }

        let on_hand = state.stock.entry(title.to_string()).or_insert(0);
        *on_hand -= i64::from(quantity);
        Ok(DecrementOutcome::Applied(*on_hand))
    }

    async fn quantity_on_hand(&self, title: &str) -> Result<Option<i64>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.stock.get(title).copied())
    }

    async fn stock_if_absent(&self, title: &str, quantity: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.stock.contains_key(title) {
            return Ok(false);
        }
        state.stock.insert(title.to_string(), quantity);
        Ok(true)
    }
}

/// Decrements stock for every title of an order, once per title.
pub struct InventoryHandler {
    inventory: Arc<dyn InventoryRepository>,
}

impl InventoryHandler {
    pub fn new(inventory: Arc<dyn InventoryRepository>) -> Self {
        Self { inventory }
    }

    async fn apply_item(&self, order_id: Uuid, title: &str, quantity: u32) -> Result<bool, InventoryError> {
        let outcome = self
            .inventory
            .decrement_once(order_id, title, quantity)
            .await
            .map_err(|source| InventoryError::Store {
                title: title.to_string(),
                source,
            })?;

        match outcome {
            DecrementOutcome::Applied(remaining) => {
                if remaining < 0 {
                    warn!(
                        "Stock for '{}' is negative ({}) after order {}; back-ordered",
                        title, remaining, order_id
                    );
                } else {
                    debug!("Stock for '{}' now {} after order {}", title, remaining, order_id);
                }
                Ok(true)
            }
            DecrementOutcome::Duplicate => {
                debug!("Order {} already decremented '{}'", order_id, title);
                Ok(false)
            }
            DecrementOutcome::UnknownProduct => Err(InventoryError::UnknownProduct(title.to_string())),
        }
    }
}

/// Sums the quantities of line items sharing a title, in first-seen order. The
/// dedup marker is per `(order, title)`, so each title is decremented once.
fn quantities_by_title(items: &[LineItem]) -> Vec<(&str, u32)> {
    let mut merged: Vec<(&str, u32)> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|(title, _)| *title == item.title) {
            Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
            None => merged.push((item.title.as_str(), item.quantity)),
        }
    }
    merged
}

#[async_trait]
impl EventHandler for InventoryHandler {
    fn name(&self) -> &str {
        CONSUMER_NAME
    }

    async fn handle(&self, event: &OrderEvent) -> FolioResult<HandleOutcome> {
        let mut applied = 0usize;
        let mut failures = Vec::new();

        for (title, quantity) in quantities_by_title(&event.line_items) {
            match self.apply_item(event.order_id, title, quantity).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("Inventory update for order {} failed: {}", event.order_id, e);
                    failures.push(e.to_string());
                }
            }
        }

        if !failures.is_empty() {
            return Err(FolioError::consumer(CONSUMER_NAME, event.order_id, failures.join("; ")));
        }

        if applied == 0 {
            info!("Inventory for order {} already applied, ignoring redelivery", event.order_id);
            Ok(HandleOutcome::Duplicate)
        } else {
            info!("Inventory updated for order {} ({} units)", event.order_id, event.total_units());
            Ok(HandleOutcome::Applied)
        }
    }
}
