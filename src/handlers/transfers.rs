use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use super::{envelope, JsonBody};
use crate::auth::RequestIdentity;
use crate::error::AppError;
use crate::use_cases::{TransferInput, TransferStock};

pub async fn create_transfer(
    State(transfer): State<Arc<TransferStock>>,
    caller: RequestIdentity,
    JsonBody(input): JsonBody<TransferInput>,
) -> Result<impl IntoResponse, AppError> {
    tracing::debug!(user_id = caller.user_id, warehouse_id = input.warehouse_id, "stock transfer requested");
    let output = transfer.execute(input).await?;
    Ok((StatusCode::CREATED, envelope("Stock transferred", output)))
}
