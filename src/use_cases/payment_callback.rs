use serde::Deserialize;
use sha2::{Digest, Sha512};
use std::sync::Arc;

use crate::domain::{PaymentStatus, PaymentUpdate, PaymentUpdateOutcome};
use crate::error::AppError;
use crate::ports::TransactionRepository;

/// Notification body posted by Midtrans.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub status_code: String,
    #[serde(default)]
    pub gross_amount: String,
    #[serde(default)]
    pub signature_key: String,
    #[serde(default)]
    pub payment_type: String,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(default)]
    pub fraud_status: String,
}

pub struct HandlePaymentNotification {
    transactions: Arc<dyn TransactionRepository>,
    server_key: String,
}

impl HandlePaymentNotification {
    pub fn new(transactions: Arc<dyn TransactionRepository>, server_key: String) -> Self {
        Self {
            transactions,
            server_key,
        }
    }

    pub async fn execute(&self, notification: PaymentNotification) -> Result<PaymentUpdateOutcome, AppError> {
        if notification.order_id.trim().is_empty() {
            return Err(AppError::BadRequest("order_id is required".to_string()));
        }

        if !self.signature_matches(&notification) {
            tracing::warn!(order_code = %notification.order_id, "payment notification with bad signature");
            return Err(AppError::Unauthorized("Invalid signature".to_string()));
        }

        let update = PaymentUpdate {
            status: PaymentStatus::from_provider(&notification.transaction_status),
            payment_method: non_empty(notification.payment_type),
            provider_transaction_id: non_empty(notification.transaction_id),
            fraud_status: non_empty(notification.fraud_status),
        };

        let outcome = self
            .transactions
            .apply_payment_update(&notification.order_id, &update)
            .await?;

        match outcome {
            PaymentUpdateOutcome::Applied => tracing::info!(
                order_code = %notification.order_id,
                provider_status = %notification.transaction_status,
                status = %update.status,
                "payment status updated"
            ),
            PaymentUpdateOutcome::Ignored { current } => tracing::warn!(
                order_code = %notification.order_id,
                current = %current,
                requested = %update.status,
                "payment notification ignored, order already settled"
            ),
        }

        Ok(outcome)
    }

    fn signature_matches(&self, notification: &PaymentNotification) -> bool {
        let expected = signature(
            &notification.order_id,
            &notification.status_code,
            &notification.gross_amount,
            &self.server_key,
        );
        expected.eq_ignore_ascii_case(notification.signature_key.trim())
    }
}

/// `sha512(order_id + status_code + gross_amount + server_key)`, hex encoded.
pub fn signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
