//! Capability traits the use cases depend on. Adapters (Postgres, HTTP
//! clients, AMQP) implement them; tests substitute in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;
use std::time::Duration;
use uuid::Uuid;

use crate::clients::ClientError;
use crate::domain::{
    CustomerDetails, DashboardStats, LedgerLocation, LineItem, Location, NewTransaction,
    PaymentUpdate, PaymentUpdateOutcome, Product, ReductionOutcome, StockLevel, StockReducedEvent,
    Transaction, UserProfile,
};
use crate::events::BusError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient stock for product {product_id}: required {required}, available {available}")]
    InsufficientStock {
        product_id: i64,
        required: i64,
        available: i64,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    /// Failures that will not go away by trying again.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RepositoryError::NotFound(_)
                | RepositoryError::InsufficientStock { .. }
                | RepositoryError::Serialization(_)
        )
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Live stock at a merchant or warehouse. Never cached.
#[async_trait]
pub trait StockReader: Send + Sync {
    async fn stock_level(&self, location_id: i64, product_id: i64) -> Result<StockLevel, ClientError>;
}

#[async_trait]
pub trait LocationDirectory: Send + Sync {
    async fn get_location(&self, id: i64) -> Result<Location, ClientError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_product(&self, id: i64) -> Result<Product, ClientError>;
    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Product, ClientError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: i64) -> Result<UserProfile, ClientError>;
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub order_code: String,
    pub gross_amount: i64,
    pub items: Vec<LineItem>,
    pub customer: CustomerDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    pub token: String,
    pub redirect_url: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentSession, ClientError>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Persists the order, its lines and the outbox row for `event` atomically.
    async fn create(
        &self,
        transaction: &NewTransaction,
        event: &StockReducedEvent,
    ) -> RepositoryResult<Transaction>;

    async fn set_payment_token(&self, id: i64, token: &str) -> RepositoryResult<()>;

    async fn get_by_id(&self, id: i64) -> RepositoryResult<Transaction>;

    async fn list(
        &self,
        merchant_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Transaction>>;

    async fn apply_payment_update(
        &self,
        order_code: &str,
        update: &PaymentUpdate,
    ) -> RepositoryResult<PaymentUpdateOutcome>;

    /// Aggregates successful transactions, optionally for one merchant.
    async fn dashboard_stats(&self, merchant_id: Option<i64>) -> RepositoryResult<DashboardStats>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedEvent {
    pub event_id: Uuid,
    pub consumer: String,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub reason: String,
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn stock_level(&self, location: LedgerLocation, product_id: i64) -> RepositoryResult<StockLevel>;

    /// Conditional decrement of a single ledger row.
    async fn reduce(
        &self,
        location: LedgerLocation,
        product_id: i64,
        quantity: i64,
    ) -> RepositoryResult<StockLevel>;

    /// Applies every line of `event` and records it as processed by
    /// `consumer`, all or nothing.
    async fn apply_reduction(
        &self,
        event: &StockReducedEvent,
        consumer: &str,
    ) -> RepositoryResult<ReductionOutcome>;

    /// Adds stock to a merchant and queues `event` (the warehouse decrement)
    /// in the same transaction.
    async fn receive_transfer(
        &self,
        merchant_id: i64,
        product_id: i64,
        quantity: i64,
        event: &StockReducedEvent,
    ) -> RepositoryResult<StockLevel>;

    async fn record_failure(&self, failure: &FailedEvent) -> RepositoryResult<()>;

    async fn latest_failure(&self, event_id: Uuid) -> RepositoryResult<FailedEvent>;
}

#[async_trait]
pub trait LocationRepository: Send + Sync {
    async fn find_location(&self, location: LedgerLocation) -> RepositoryResult<Location>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboxMessage {
    pub id: i64,
    pub event_id: Uuid,
    pub routing_key: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Leases up to `limit` unpublished messages so other dispatchers skip them.
    async fn claim_batch(&self, limit: i64) -> RepositoryResult<Vec<OutboxMessage>>;
    async fn mark_published(&self, id: i64) -> RepositoryResult<()>;
    /// Counts a failed attempt and keeps the message unclaimable for `retry_in`.
    async fn mark_failed(&self, id: i64, error: &str, retry_in: Duration) -> RepositoryResult<()>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError>;
}
