use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use folio_catalog::StockLevel;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/inventory/{title}", get(get_stock))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> Result<Json<StockLevel>, AppError> {
    let quantity_on_hand = state
        .inventory
        .quantity_on_hand(&title)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("No stock record for '{}'", title)))?;

    Ok(Json(StockLevel { title, quantity_on_hand }))
}
