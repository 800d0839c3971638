pub mod product;
pub mod inventory;

pub use product::{seed_inventory, Product, CATALOG_STOCK};
pub use inventory::{
    DecrementOutcome, InMemoryInventory, InventoryError, InventoryHandler, InventoryRepository, StockLevel,
};
