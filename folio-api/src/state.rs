use std::sync::Arc;
use folio_catalog::InventoryRepository;
use folio_order::{OrderIngestionService, OrderRepository};

#[derive(Clone)]
pub struct AppState {
    pub ingestion: Arc<OrderIngestionService>,
    pub orders: Arc<dyn OrderRepository>,
    pub inventory: Arc<dyn InventoryRepository>,
}
