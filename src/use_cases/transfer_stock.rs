use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{LedgerLocation, StockLevel, StockLine, StockReducedEvent};
use crate::error::AppError;
use crate::ports::{LedgerRepository, StockReader};

#[derive(Debug, Clone, Deserialize)]
pub struct TransferInput {
    pub merchant_id: i64,
    pub warehouse_id: i64,
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransferOutput {
    pub merchant_stock: StockLevel,
    pub transfer_code: String,
}

/// Moves stock from a warehouse onto a merchant's shelf. The merchant ledger
/// grows right away; the warehouse ledger shrinks when its consumer applies
/// the queued event.
pub struct TransferStock {
    warehouse_stock: Arc<dyn StockReader>,
    ledger: Arc<dyn LedgerRepository>,
}

impl TransferStock {
    pub fn new(warehouse_stock: Arc<dyn StockReader>, ledger: Arc<dyn LedgerRepository>) -> Self {
        Self {
            warehouse_stock,
            ledger,
        }
    }

    pub async fn execute(&self, input: TransferInput) -> Result<TransferOutput, AppError> {
        if input.merchant_id <= 0 || input.warehouse_id <= 0 || input.product_id <= 0 {
            return Err(AppError::BadRequest(
                "merchant_id, warehouse_id and product_id are required".to_string(),
            ));
        }
        if input.quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be positive".to_string()));
        }

        let available = self
            .warehouse_stock
            .stock_level(input.warehouse_id, input.product_id)
            .await?;
        if available.stock < input.quantity {
            return Err(AppError::InsufficientStock {
                product_id: input.product_id,
                required: input.quantity,
                available: available.stock,
            });
        }

        let transfer_code = format!(
            "TRANSFER_{}_{}_{}",
            input.warehouse_id,
            input.merchant_id,
            chrono::Utc::now().timestamp_millis()
        );
        let event = StockReducedEvent::new(
            LedgerLocation::warehouse(input.warehouse_id),
            vec![StockLine {
                product_id: input.product_id,
                quantity: input.quantity,
            }],
            transfer_code.clone(),
        );

        let merchant_stock = self
            .ledger
            .receive_transfer(input.merchant_id, input.product_id, input.quantity, &event)
            .await?;

        tracing::info!(
            merchant_id = input.merchant_id,
            warehouse_id = input.warehouse_id,
            product_id = input.product_id,
            quantity = input.quantity,
            event_id = %event.event_id,
            "stock transferred to merchant"
        );

        Ok(TransferOutput {
            merchant_stock,
            transfer_code,
        })
    }
}
