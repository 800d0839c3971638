use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use folio_order::{CreateOrderRequest, Order};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{order_id}", get(get_order))
}

async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let Json(req) = payload?;
    let receipt = state.ingestion.create_order(req).await?;

    if !receipt.fully_published() {
        info!(
            "Order {} accepted with unpublished channels {:?}",
            receipt.order_id, receipt.failed_channels
        );
    }

    Ok((StatusCode::CREATED, Json(CreateOrderResponse { order_id: receipt.order_id })))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get_order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Order {} not found", order_id)))?;

    Ok(Json(order))
}
