use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::order::{Customer, LineItem};

/// Snapshot of an order at creation time, fanned out to every downstream channel.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderEvent {
    #[serde(rename = "orderid")]
    pub order_id: Uuid,
    #[serde(rename = "products")]
    pub line_items: Vec<LineItem>,
    pub customer: Customer,
    pub created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn total_units(&self) -> u64 {
        self.line_items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// An event a consumer gave up on, parked on the dead-letter channel.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct DeadLetterEvent {
    pub consumer: String,
    pub channel: String,
    pub order_id: Option<Uuid>,
    pub reason: String,
    pub payload: String,
    pub failed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_event_uses_record_field_names() {
        let event = OrderEvent {
            order_id: Uuid::new_v4(),
            line_items: vec![LineItem::new("Book A", 2, 10.0), LineItem::new("Book B", 1, 5.0)],
            customer: Customer::default(),
            created_at: Utc::now(),
        };

        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["orderid"], event.order_id.to_string());
        assert_eq!(value["products"].as_array().unwrap().len(), 2);
        assert_eq!(event.total_units(), 3);
    }
}
