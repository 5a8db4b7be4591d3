//! Applies stock-reduction events to this service's ledger.
//!
//! Outcome per delivery:
//! - applied or already applied: ack
//! - the ledger cannot satisfy the event (missing row, not enough stock):
//!   dead-letter it to `stock_event_failures`, alert, ack
//! - transient persistence failure: requeue
//! - undecodable or addressed to the wrong kind of location: reject

use std::sync::Arc;

use crate::domain::{LedgerLocation, LocationKind, ReductionOutcome, StockLevel, StockReducedEvent};
use crate::error::AppError;
use crate::events::Disposition;
use crate::ports::{FailedEvent, LedgerRepository};

pub struct ReduceStock {
    ledger: Arc<dyn LedgerRepository>,
    consumer: String,
    expected: LocationKind,
}

impl ReduceStock {
    pub fn new(ledger: Arc<dyn LedgerRepository>, consumer: impl Into<String>, expected: LocationKind) -> Self {
        Self {
            ledger,
            consumer: consumer.into(),
            expected,
        }
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Single conditional decrement, used for manual reconciliation.
    pub async fn reduce(
        &self,
        location: LedgerLocation,
        product_id: i64,
        quantity: i64,
    ) -> Result<StockLevel, AppError> {
        if quantity <= 0 {
            return Err(AppError::BadRequest("quantity must be positive".to_string()));
        }

        let level = self.ledger.reduce(location, product_id, quantity).await?;
        tracing::info!(
            location = %location,
            product_id,
            quantity,
            stock = level.stock,
            "stock reduced"
        );
        Ok(level)
    }

    pub async fn handle(&self, routing_key: &str, payload: &[u8]) -> Disposition {
        let event: StockReducedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(routing_key = %routing_key, error = %e, "undecodable stock event");
                return Disposition::Reject;
            }
        };

        if event.location.kind != self.expected {
            tracing::error!(
                event_id = %event.event_id,
                location = %event.location,
                consumer = %self.consumer,
                "stock event addressed to another kind of location"
            );
            return Disposition::Reject;
        }

        if event.items.is_empty() || event.items.iter().any(|line| line.quantity <= 0) {
            return self
                .dead_letter(routing_key, &event, "event has no lines or a non-positive quantity")
                .await;
        }

        match self.ledger.apply_reduction(&event, &self.consumer).await {
            Ok(ReductionOutcome::Applied) => {
                tracing::info!(
                    event_id = %event.event_id,
                    order_code = %event.order_code,
                    location = %event.location,
                    lines = event.items.len(),
                    "stock event applied"
                );
                Disposition::Ack
            }
            Ok(ReductionOutcome::Duplicate) => {
                tracing::info!(event_id = %event.event_id, "stock event already applied, skipping");
                Disposition::Ack
            }
            Err(e) if e.is_permanent() => self.dead_letter(routing_key, &event, &e.to_string()).await,
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "stock event failed, requeueing");
                Disposition::Requeue
            }
        }
    }

    async fn dead_letter(&self, routing_key: &str, event: &StockReducedEvent, reason: &str) -> Disposition {
        tracing::error!(
            event_id = %event.event_id,
            order_code = %event.order_code,
            location = %event.location,
            reason = %reason,
            "stock event cannot be applied, moving to dead letter"
        );

        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "failed to encode dead letter");
                return Disposition::Requeue;
            }
        };

        let failure = FailedEvent {
            event_id: event.event_id,
            consumer: self.consumer.clone(),
            routing_key: routing_key.to_string(),
            payload,
            reason: reason.to_string(),
        };

        match self.ledger.record_failure(&failure).await {
            Ok(()) => Disposition::Ack,
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "failed to record dead letter");
                Disposition::Requeue
            }
        }
    }
}
