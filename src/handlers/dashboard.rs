use axum::{
    extract::{Path, State},
    response::IntoResponse,
};

use super::envelope;
use crate::app::TransactionState;
use crate::auth::RequestIdentity;
use crate::error::AppError;

pub async fn manager_dashboard(
    State(state): State<TransactionState>,
    caller: RequestIdentity,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.dashboard.global(&caller).await?;
    Ok(envelope("Dashboard retrieved", stats))
}

pub async fn keeper_dashboard(
    State(state): State<TransactionState>,
    caller: RequestIdentity,
    Path(merchant_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.dashboard.for_merchant(&caller, merchant_id).await?;
    Ok(envelope("Dashboard retrieved", stats))
}
