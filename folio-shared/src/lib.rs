pub mod models;
pub mod pii;

pub use models::events::{DeadLetterEvent, OrderEvent};
pub use models::order::{Customer, LineItem, Location};
pub use pii::Masked;
