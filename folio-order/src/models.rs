use chrono::{DateTime, Utc};
use folio_shared::{Customer, LineItem, Masked, OrderEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The authoritative record of a customer's purchase.
///
/// Everything except `deliveries` is fixed at creation; `deliveries` is written
/// only by the dispatch consumer through a targeted update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    #[serde(rename = "orderid")]
    pub order_id: Uuid,
    #[serde(rename = "products")]
    pub line_items: Vec<LineItem>,
    pub customer: Customer,
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn new(line_items: Vec<LineItem>, customer: Customer) -> Self {
        Self {
            order_id: Uuid::new_v4(),
            line_items,
            customer,
            deliveries: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Snapshot published to the broker. Deliveries are never part of it.
    pub fn to_event(&self) -> OrderEvent {
        OrderEvent {
            order_id: self.order_id,
            line_items: self.line_items.clone(),
            customer: self.customer.clone(),
            created_at: self.created_at,
        }
    }

    pub fn total(&self) -> f64 {
        self.line_items.iter().map(LineItem::subtotal).sum()
    }

    pub fn is_dispatched(&self) -> bool {
        !self.deliveries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShippingMethod {
    Usps,
    Ups,
    Fedex,
    Dhl,
}

impl fmt::Display for ShippingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShippingMethod::Usps => "USPS",
            ShippingMethod::Ups => "UPS",
            ShippingMethod::Fedex => "FEDEX",
            ShippingMethod::Dhl => "DHL",
        };
        f.write_str(name)
    }
}

impl FromStr for ShippingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USPS" => Ok(ShippingMethod::Usps),
            "UPS" => Ok(ShippingMethod::Ups),
            "FEDEX" => Ok(ShippingMethod::Fedex),
            "DHL" => Ok(ShippingMethod::Dhl),
            other => Err(format!("unknown shipping method: {}", other)),
        }
    }
}

/// Carrier tracking number: 20 decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingNumber(String);

impl TrackingNumber {
    pub const LENGTH: usize = 20;

    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let digits: String = (0..Self::LENGTH)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(digits)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackingNumber {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingAddress {
    pub name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub address1: String,
    pub address2: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "postalcode")]
    pub postal_code: String,
    pub country: String,
    pub phone: Masked<String>,
}

impl From<&Customer> for ShippingAddress {
    fn from(customer: &Customer) -> Self {
        let location = &customer.location;
        Self {
            name: customer.name.clone(),
            last_name: customer.last_name.clone(),
            address1: location.address1.clone(),
            address2: location.address2.clone(),
            city: location.city.clone(),
            state: location.state.clone(),
            postal_code: location.postal_code.clone(),
            country: location.country.clone(),
            phone: location.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub shipping_address: ShippingAddress,
    pub shipping_method: ShippingMethod,
    pub tracking_number: TrackingNumber,
    #[serde(default = "Utc::now")]
    pub assigned_at: DateTime<Utc>,
}

/// Result of the conditional delivery write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Recorded,
    /// The order already had a delivery; nothing was written.
    AlreadyRecorded(TrackingNumber),
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_shared::Location;

    fn customer() -> Customer {
        Customer {
            name: "Jane".to_string(),
            last_name: "Doe".to_string(),
            email: Masked::new("jane@example.com".to_string()),
            phone: Masked::new("555-0100".to_string()),
            location: Location {
                address1: "1 Main St".to_string(),
                city: "Springfield".to_string(),
                postal_code: "12345".to_string(),
                country: "US".to_string(),
                phone: Masked::new("555-0199".to_string()),
                ..Location::default()
            },
        }
    }

    #[test]
    fn test_new_order_has_no_deliveries() {
        let order = Order::new(vec![LineItem::new("Book A", 2, 10.0), LineItem::new("Book B", 1, 5.0)], customer());

        assert!(!order.is_dispatched());
        assert_eq!(order.total(), 25.0);

        let event = order.to_event();
        assert_eq!(event.order_id, order.order_id);
        assert_eq!(event.line_items, order.line_items);
    }

    #[test]
    fn test_tracking_numbers_are_twenty_digits() {
        let a = TrackingNumber::generate();
        let b = TrackingNumber::generate();

        assert_eq!(a.as_str().len(), TrackingNumber::LENGTH);
        assert!(a.as_str().chars().all(|c| c.is_ascii_digit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_shipping_address_from_customer() {
        let address = ShippingAddress::from(&customer());

        assert_eq!(address.last_name, "Doe");
        assert_eq!(address.postal_code, "12345");
        assert_eq!(address.phone.expose(), "555-0199");
    }

    #[test]
    fn test_shipping_method_parsing() {
        assert_eq!("usps".parse::<ShippingMethod>(), Ok(ShippingMethod::Usps));
        assert_eq!(" FedEx ".parse::<ShippingMethod>(), Ok(ShippingMethod::Fedex));
        assert!("pigeon".parse::<ShippingMethod>().is_err());
        assert_eq!(serde_json::to_value(ShippingMethod::Dhl).unwrap(), "DHL");
    }

    #[test]
    fn test_delivery_wire_names() {
        let delivery = Delivery {
            shipping_address: ShippingAddress::from(&customer()),
            shipping_method: ShippingMethod::Usps,
            tracking_number: TrackingNumber::from("12345678901234567890"),
            assigned_at: Utc::now(),
        };

        let value = serde_json::to_value(&delivery).unwrap();
        assert_eq!(value["shippingMethod"], "USPS");
        assert_eq!(value["trackingNumber"], "12345678901234567890");
        assert_eq!(value["shippingAddress"]["lastname"], "Doe");
    }
}
