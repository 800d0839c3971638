use async_trait::async_trait;
use folio_shared::OrderEvent;
use crate::FolioResult;

/// What a consumer did with one delivered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Applied,
    /// The side effect was already recorded for this order.
    Duplicate,
}

/// One downstream capability fed by a broker channel.
///
/// Implementations must be idempotent: the broker delivers at least once and
/// several instances may consume the same channel.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &OrderEvent) -> FolioResult<HandleOutcome>;
}
