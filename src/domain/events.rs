use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ledger::{LedgerLocation, LocationKind};
use crate::domain::transaction::LineItem;

pub const BUSINESS_EVENTS_EXCHANGE: &str = "business_events";

pub const MERCHANT_STOCK_REDUCED: &str = "merchant.stock.reduced";
pub const WAREHOUSE_STOCK_REDUCED: &str = "warehouse.stock.reduced";

pub const MERCHANT_STOCK_QUEUE: &str = "merchant_stock_events";
pub const MERCHANT_STOCK_BINDING: &str = "merchant.stock.*";
pub const WAREHOUSE_STOCK_QUEUE: &str = "warehouse_stock_events";
pub const WAREHOUSE_STOCK_BINDING: &str = "warehouse.stock.*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: i64,
    pub quantity: i64,
}

/// Broadcast once stock leaves a location. Consumers apply it at-least-once,
/// deduplicated by `event_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReducedEvent {
    pub event_id: Uuid,
    pub location: LedgerLocation,
    pub items: Vec<StockLine>,
    pub order_code: String,
    pub timestamp: DateTime<Utc>,
}

impl StockReducedEvent {
    pub fn new(location: LedgerLocation, items: Vec<StockLine>, order_code: String) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            location,
            items,
            order_code,
            timestamp: Utc::now(),
        }
    }

    /// Stock sold by a merchant under `order_code`.
    pub fn for_order(merchant_id: i64, order_code: &str, items: &[LineItem]) -> Self {
        let lines = items
            .iter()
            .map(|item| StockLine {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect();
        Self::new(LedgerLocation::merchant(merchant_id), lines, order_code.to_string())
    }

    pub fn routing_key(&self) -> &'static str {
        routing_key_for(self.location.kind)
    }
}

pub fn routing_key_for(kind: LocationKind) -> &'static str {
    match kind {
        LocationKind::Merchant => MERCHANT_STOCK_REDUCED,
        LocationKind::Warehouse => WAREHOUSE_STOCK_REDUCED,
    }
}
