pub mod models;
pub mod repository;
pub mod manager;
pub mod ingestion;
pub mod dispatch;
pub mod notification;

pub use models::{Delivery, DeliveryOutcome, Order, ShippingAddress, ShippingMethod, TrackingNumber};
pub use repository::OrderRepository;
pub use manager::InMemoryOrderRepository;
pub use ingestion::{CreateOrderRequest, IngestionTimeouts, OrderIngestionService, OrderReceipt};
pub use dispatch::{DispatchHandler, FixedShipping, ShippingPolicy};
pub use notification::{
    NotificationClient, NotificationHandler, NotificationPayload, NotifyError, RecordingNotificationClient,
};
