use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use super::envelope;
use crate::app::LedgerState;
use crate::domain::LedgerLocation;
use crate::error::AppError;

pub async fn get_location(
    State(state): State<LedgerState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let location = state
        .locations
        .find_location(LedgerLocation { kind: state.kind, id })
        .await?;
    Ok(envelope("Location retrieved", location))
}

/// Live stock, read straight from the ledger.
pub async fn get_stock(
    State(state): State<LedgerState>,
    Path((id, product_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let level = state
        .ledger
        .stock_level(LedgerLocation { kind: state.kind, id }, product_id)
        .await?;
    Ok(envelope("Stock retrieved", level))
}
