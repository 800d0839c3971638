use serde::{Deserialize, Serialize};
use crate::pii::Masked;

/// One book in an order.
///
/// Field names on the wire follow the bookstore record layout (`pages`,
/// `publication`, `price`) used by existing clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub genre: String,
    #[serde(rename = "pages", default)]
    pub page_count: u32,
    #[serde(rename = "publication", default)]
    pub publication_year: String,
    pub quantity: u32,
    #[serde(rename = "price")]
    pub unit_price: f64,
}

impl LineItem {
    pub fn new(title: impl Into<String>, quantity: u32, unit_price: f64) -> Self {
        Self {
            title: title.into(),
            author: String::new(),
            genre: String::new(),
            page_count: 0,
            publication_year: String::new(),
            quantity,
            unit_price,
        }
    }

    pub fn subtotal(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub address1: String,
    #[serde(default)]
    pub address2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(rename = "postalcode", default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub phone: Masked<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    #[serde(rename = "lastname", default)]
    pub last_name: String,
    pub email: Masked<String>,
    #[serde(default)]
    pub phone: Masked<String>,
    #[serde(default)]
    pub location: Location,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name).trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_wire_names() {
        let json = serde_json::json!({
            "title": "1984",
            "author": "George Orwell",
            "genre": "Dystopian",
            "pages": 328,
            "publication": "1949",
            "quantity": 2,
            "price": 12.5
        });

        let item: LineItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.page_count, 328);
        assert_eq!(item.publication_year, "1949");
        assert_eq!(item.subtotal(), 25.0);

        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out["pages"], 328);
        assert_eq!(out["price"], 12.5);
    }

    #[test]
    fn test_customer_defaults_optional_fields() {
        let json = serde_json::json!({ "name": "Jane", "email": "jane@example.com" });
        let customer: Customer = serde_json::from_value(json).unwrap();

        assert_eq!(customer.full_name(), "Jane");
        assert!(customer.phone.is_blank());
        assert_eq!(customer.location, Location::default());
    }
}
