use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const TAX_RATE_PERCENT: i64 = 11;
pub const DEFAULT_PAYMENT_METHOD: &str = "qris";
pub const DEFAULT_CURRENCY: &str = "IDR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Expired,
    Cancel,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
            PaymentStatus::Cancel => "cancel",
        }
    }

    /// Maps the payment provider's status vocabulary onto ours.
    /// Anything unrecognized counts as a failure.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "capture" | "settlement" => PaymentStatus::Success,
            "pending" => PaymentStatus::Pending,
            "deny" => PaymentStatus::Failed,
            "cancel" => PaymentStatus::Cancel,
            "expire" => PaymentStatus::Expired,
            _ => PaymentStatus::Failed,
        }
    }

    /// Only `pending` moves; re-applying the current status is allowed.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self == next || self == PaymentStatus::Pending
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "expired" => Ok(PaymentStatus::Expired),
            "cancel" => Ok(PaymentStatus::Cancel),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: i64,
    pub quantity: i64,
    pub price: i64,
}

impl LineItem {
    /// `None` when `quantity * price` does not fit in an `i64`.
    pub fn checked_sub_total(&self) -> Option<i64> {
        self.quantity.checked_mul(self.price)
    }

    /// Line total for an item whose order already passed
    /// [`Totals::compute`]. Saturates instead of wrapping.
    pub fn sub_total(&self) -> i64 {
        self.quantity.saturating_mul(self.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub sub_total: i64,
    pub tax_total: i64,
    pub grand_total: i64,
}

impl Totals {
    /// Returns `None` if any line, the sum or the tax overflows.
    pub fn compute(items: &[LineItem]) -> Option<Self> {
        let sub_total = items
            .iter()
            .try_fold(0i64, |acc, item| acc.checked_add(item.checked_sub_total()?))?;
        let tax_total = sub_total.checked_mul(TAX_RATE_PERCENT)? / 100;
        Some(Self {
            sub_total,
            tax_total,
            grand_total: sub_total.checked_add(tax_total)?,
        })
    }
}

/// Quantity per product, summing lines that repeat a product.
/// `None` when a summed quantity overflows.
pub fn required_quantities(items: &[LineItem]) -> Option<BTreeMap<i64, i64>> {
    let mut required = BTreeMap::new();
    for item in items {
        let total: &mut i64 = required.entry(item.product_id).or_insert(0);
        *total = total.checked_add(item.quantity)?;
    }
    Some(required)
}

pub fn generate_order_code(merchant_id: i64, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("ORDER_{}_{}_{}", now.timestamp(), merchant_id, &suffix[..8])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
}

/// An order ready to be persisted, totals already computed.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub customer: CustomerDetails,
    pub merchant_id: i64,
    pub order_code: String,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub payment_method: String,
    pub currency: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub sub_total: i64,
    pub tax_total: i64,
    pub grand_total: i64,
    pub merchant_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_method: String,
    pub order_code: String,
    pub provider_transaction_id: Option<String>,
    pub payment_token: Option<String>,
    pub fraud_status: Option<String>,
    pub notes: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub products: Vec<TransactionProduct>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionProduct {
    pub id: i64,
    pub transaction_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub price: i64,
    pub sub_total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// Fields a payment callback may change. Empty optional values leave the
/// stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub payment_method: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub fraud_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentUpdateOutcome {
    Applied,
    /// The order already left `pending` for a different status.
    Ignored { current: PaymentStatus },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_revenue: i64,
    pub total_transactions: i64,
    pub total_products_sold: i64,
}
