use crate::inventory::InventoryRepository;
use folio_core::StoreError;
use folio_shared::LineItem;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Starting stock for every catalogue title.
pub const CATALOG_STOCK: i64 = 98;

/// A book the store sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub title: String,
    pub author: String,
    pub genre: String,
    #[serde(rename = "pages")]
    pub page_count: u32,
    #[serde(rename = "publication")]
    pub publication_year: String,
    #[serde(rename = "price")]
    pub unit_price: f64,
}

impl Product {
    fn book(title: &str, author: &str, genre: &str, page_count: u32, year: &str, unit_price: f64) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
            genre: genre.to_string(),
            page_count,
            publication_year: year.to_string(),
            unit_price,
        }
    }

    /// The standing catalogue.
    pub fn catalog() -> Vec<Product> {
        vec![
            Self::book("The Lord of the Rings", "J.R.R. Tolkien", "Fantasy", 1224, "1954", 20.0),
            Self::book("To Kill a Mockingbird", "Harper Lee", "Fiction", 336, "1960", 15.0),
            Self::book("Harry Potter and the Sorcerer's Stone", "J.K. Rowling", "Fantasy", 320, "1997", 18.0),
            Self::book("1984", "George Orwell", "Dystopian", 328, "1949", 12.5),
            Self::book("The Great Gatsby", "F. Scott Fitzgerald", "Classic", 180, "1925", 10.0),
        ]
    }

    pub fn line_item(&self, quantity: u32) -> LineItem {
        LineItem {
            title: self.title.clone(),
            author: self.author.clone(),
            genre: self.genre.clone(),
            page_count: self.page_count,
            publication_year: self.publication_year.clone(),
            quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Stocks each product with `quantity` units unless it already has a record.
/// Returns how many records were created.
pub async fn seed_inventory(
    inventory: &dyn InventoryRepository,
    products: &[Product],
    quantity: i64,
) -> Result<usize, StoreError> {
    let mut created = 0;
    for product in products {
        if inventory.stock_if_absent(&product.title, quantity).await? {
            debug!("Seeded '{}' with {} units", product.title, quantity);
            created += 1;
        }
    }
    info!("Catalogue seed: {} of {} products stocked", created, products.len());
    Ok(created)
}
