use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use super::{envelope, JsonBody};
use crate::app::TransactionState;
use crate::auth::RequestIdentity;
use crate::error::AppError;
use crate::use_cases::CreateTransactionInput;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub merchant_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn create_transaction(
    State(state): State<TransactionState>,
    caller: RequestIdentity,
    JsonBody(input): JsonBody<CreateTransactionInput>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!(user_id = caller.user_id, merchant_id = input.merchant_id, "create transaction");
    let output = state.create.execute(input).await?;
    Ok((StatusCode::CREATED, envelope("Transaction created", output)))
}

pub async fn list_transactions(
    State(state): State<TransactionState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let transactions = state
        .queries
        .list(query.merchant_id, query.limit, query.offset)
        .await?;
    Ok(envelope("Transactions retrieved", transactions))
}

pub async fn get_transaction(
    State(state): State<TransactionState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let transaction = state.queries.get(id).await?;
    Ok(envelope("Transaction retrieved", transaction))
}
