use axum::{extract::State, response::IntoResponse};
use serde_json::json;

use super::{envelope, JsonBody};
use crate::app::TransactionState;
use crate::domain::PaymentUpdateOutcome;
use crate::error::AppError;
use crate::use_cases::PaymentNotification;

/// Midtrans expects a 2xx for every notification it should stop retrying,
/// including the ones that no longer change anything.
pub async fn midtrans_callback(
    State(state): State<TransactionState>,
    JsonBody(notification): JsonBody<PaymentNotification>,
) -> Result<impl IntoResponse, AppError> {
    let order_code = notification.order_id.clone();
    let response = match state.callback.execute(notification).await? {
        PaymentUpdateOutcome::Applied => {
            envelope("Payment status updated", json!({ "order_code": order_code }))
        }
        PaymentUpdateOutcome::Ignored { current } => envelope(
            "Notification ignored",
            json!({ "order_code": order_code, "payment_status": current }),
        ),
    };
    Ok(response)
}
