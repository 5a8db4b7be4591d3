//! In-memory implementations of the ports for unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::clients::ClientError;
use crate::domain::{
    CustomerDetails, DashboardStats, LedgerLocation, LineItem, Location, NewTransaction,
    PaymentStatus, PaymentUpdate, PaymentUpdateOutcome, Product, ReductionOutcome, StockLevel,
    StockReducedEvent, Totals, Transaction, TransactionProduct, UserProfile,
};
use crate::events::BusError;
use crate::ports::*;

fn offline() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct MemoryLedger {
    rows: Mutex<HashMap<(LedgerLocation, i64), i64>>,
    processed: Mutex<Vec<(Uuid, String)>>,
    failures: Mutex<Vec<FailedEvent>>,
    outbox: Mutex<Vec<StockReducedEvent>>,
    locations: Mutex<HashMap<LedgerLocation, Location>>,
    offline: AtomicBool,
}

impl MemoryLedger {
    pub fn set_stock(&self, location: LedgerLocation, product_id: i64, stock: i64) {
        self.rows.lock().unwrap().insert((location, product_id), stock);
    }

    pub fn stock(&self, location: LedgerLocation, product_id: i64) -> Option<i64> {
        self.rows.lock().unwrap().get(&(location, product_id)).copied()
    }

    pub fn failures(&self) -> Vec<FailedEvent> {
        self.failures.lock().unwrap().clone()
    }

    pub fn outbox(&self) -> Vec<StockReducedEvent> {
        self.outbox.lock().unwrap().clone()
    }

    pub fn add_location(&self, location: LedgerLocation, keeper_id: Option<i64>) {
        self.locations.lock().unwrap().insert(
            location,
            Location {
                id: location.id,
                name: format!("{} {}", location.kind.as_str(), location.id),
                address: String::new(),
                phone: String::new(),
                keeper_id,
            },
        );
    }

    pub fn fail_with_database_error(&self, fail: bool) {
        self.offline.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> RepositoryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(offline());
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedger {
    async fn stock_level(&self, location: LedgerLocation, product_id: i64) -> RepositoryResult<StockLevel> {
        self.check()?;
        self.stock(location, product_id)
            .map(|stock| StockLevel {
                location_id: location.id,
                product_id,
                stock,
            })
            .ok_or_else(|| RepositoryError::NotFound(format!("product {} at {}", product_id, location)))
    }

    async fn reduce(&self, location: LedgerLocation, product_id: i64, quantity: i64) -> RepositoryResult<StockLevel> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let stock = rows
            .get_mut(&(location, product_id))
            .ok_or_else(|| RepositoryError::NotFound(format!("product {} at {}", product_id, location)))?;
        if *stock < quantity {
            return Err(RepositoryError::InsufficientStock {
                product_id,
                required: quantity,
                available: *stock,
            });
        }
        *stock -= quantity;
        Ok(StockLevel {
            location_id: location.id,
            product_id,
            stock: *stock,
        })
    }

    async fn apply_reduction(&self, event: &StockReducedEvent, consumer: &str) -> RepositoryResult<ReductionOutcome> {
        self.check()?;
        let mut processed = self.processed.lock().unwrap();
        let key = (event.event_id, consumer.to_string());
        if processed.contains(&key) {
            return Ok(ReductionOutcome::Duplicate);
        }

        let mut rows = self.rows.lock().unwrap();
        let mut staged = rows.clone();
        for line in &event.items {
            let stock = staged.get_mut(&(event.location, line.product_id)).ok_or_else(|| {
                RepositoryError::NotFound(format!("product {} at {}", line.product_id, event.location))
            })?;
            if *stock < line.quantity {
                return Err(RepositoryError::InsufficientStock {
                    product_id: line.product_id,
                    required: line.quantity,
                    available: *stock,
                });
            }
            *stock -= line.quantity;
        }

        *rows = staged;
        processed.push(key);
        Ok(ReductionOutcome::Applied)
    }

    async fn receive_transfer(
        &self,
        merchant_id: i64,
        product_id: i64,
        quantity: i64,
        event: &StockReducedEvent,
    ) -> RepositoryResult<StockLevel> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        let stock = rows.entry((LedgerLocation::merchant(merchant_id), product_id)).or_insert(0);
        *stock += quantity;
        self.outbox.lock().unwrap().push(event.clone());
        Ok(StockLevel {
            location_id: merchant_id,
            product_id,
            stock: *stock,
        })
    }

    async fn record_failure(&self, failure: &FailedEvent) -> RepositoryResult<()> {
        self.check()?;
        self.failures.lock().unwrap().push(failure.clone());
        Ok(())
    }

    async fn latest_failure(&self, event_id: Uuid) -> RepositoryResult<FailedEvent> {
        self.check()?;
        self.failures
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|f| f.event_id == event_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("failed event {}", event_id)))
    }
}

#[async_trait]
impl LocationRepository for MemoryLedger {
    async fn find_location(&self, location: LedgerLocation) -> RepositoryResult<Location> {
        self.check()?;
        self.locations
            .lock()
            .unwrap()
            .get(&location)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(location.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryTransactions {
    rows: Mutex<Vec<Transaction>>,
    outbox: Mutex<Vec<StockReducedEvent>>,
}

impl MemoryTransactions {
    pub fn get(&self, id: i64) -> Option<Transaction> {
        self.rows.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    pub fn by_order_code(&self, order_code: &str) -> Option<Transaction> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.order_code == order_code)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn outbox(&self) -> Vec<StockReducedEvent> {
        self.outbox.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionRepository for MemoryTransactions {
    async fn create(&self, new: &NewTransaction, event: &StockReducedEvent) -> RepositoryResult<Transaction> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i64 + 1;
        let now = Utc::now();
        let transaction = Transaction {
            id,
            name: new.customer.name.clone(),
            phone: new.customer.phone.clone(),
            email: new.customer.email.clone(),
            address: new.customer.address.clone(),
            sub_total: new.totals.sub_total,
            tax_total: new.totals.tax_total,
            grand_total: new.totals.grand_total,
            merchant_id: new.merchant_id,
            merchant_name: None,
            payment_status: PaymentStatus::Pending,
            payment_method: new.payment_method.clone(),
            order_code: new.order_code.clone(),
            provider_transaction_id: None,
            payment_token: None,
            fraud_status: None,
            notes: new.notes.clone(),
            currency: new.currency.clone(),
            created_at: now,
            updated_at: now,
            products: new
                .items
                .iter()
                .enumerate()
                .map(|(i, item)| TransactionProduct {
                    id: i as i64 + 1,
                    transaction_id: id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                    sub_total: item.sub_total(),
                    product_name: None,
                })
                .collect(),
        };
        rows.push(transaction.clone());
        self.outbox.lock().unwrap().push(event.clone());
        Ok(transaction)
    }

    async fn set_payment_token(&self, id: i64, token: &str) -> RepositoryResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        row.payment_token = Some(token.to_string());
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        self.get(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn list(&self, merchant_id: Option<i64>, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|t| merchant_id.map(|m| t.merchant_id == m).unwrap_or(true))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn apply_payment_update(&self, order_code: &str, update: &PaymentUpdate) -> RepositoryResult<PaymentUpdateOutcome> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|t| t.order_code == order_code)
            .ok_or_else(|| RepositoryError::NotFound(format!("order {}", order_code)))?;

        if !row.payment_status.can_transition_to(update.status) {
            return Ok(PaymentUpdateOutcome::Ignored {
                current: row.payment_status,
            });
        }

        row.payment_status = update.status;
        if let Some(method) = &update.payment_method {
            row.payment_method = method.clone();
        }
        if let Some(id) = &update.provider_transaction_id {
            row.provider_transaction_id = Some(id.clone());
        }
        if let Some(fraud) = &update.fraud_status {
            row.fraud_status = Some(fraud.clone());
        }
        Ok(PaymentUpdateOutcome::Applied)
    }

    async fn dashboard_stats(&self, merchant_id: Option<i64>) -> RepositoryResult<DashboardStats> {
        let rows = self.rows.lock().unwrap();
        let mut stats = DashboardStats::default();
        for t in rows.iter().filter(|t| {
            t.payment_status == PaymentStatus::Success
                && merchant_id.map(|m| t.merchant_id == m).unwrap_or(true)
        }) {
            stats.total_revenue += t.grand_total;
            stats.total_transactions += 1;
            stats.total_products_sold += t.products.iter().map(|p| p.quantity).sum::<i64>();
        }
        Ok(stats)
    }
}

/// Inserts a pending order for `merchant_id` with `(product, quantity, price)` lines.
pub async fn seed_transaction(repo: &MemoryTransactions, merchant_id: i64, lines: &[(i64, i64, i64)]) -> String {
    let items: Vec<LineItem> = lines
        .iter()
        .map(|&(product_id, quantity, price)| LineItem {
            product_id,
            quantity,
            price,
        })
        .collect();
    let order_code = format!("ORDER_{}_{}_{}", repo.count() + 1, merchant_id, "00000000");
    let new = NewTransaction {
        customer: CustomerDetails {
            name: "Customer".into(),
            phone: "0800".into(),
            email: String::new(),
            address: String::new(),
        },
        merchant_id,
        order_code: order_code.clone(),
        totals: Totals::compute(&items).unwrap(),
        items: items.clone(),
        payment_method: "qris".into(),
        currency: "IDR".into(),
        notes: String::new(),
    };
    let event = StockReducedEvent::for_order(merchant_id, &order_code, &items);
    repo.create(&new, &event).await.unwrap();
    order_code
}

#[derive(Default)]
pub struct FakeStock {
    levels: Mutex<HashMap<(i64, i64), i64>>,
    failing_products: Mutex<Vec<i64>>,
}

impl FakeStock {
    pub fn set(&self, location_id: i64, product_id: i64, stock: i64) {
        self.levels.lock().unwrap().insert((location_id, product_id), stock);
    }

    pub fn fail_for(&self, product_id: i64) {
        self.failing_products.lock().unwrap().push(product_id);
    }
}

#[async_trait]
impl StockReader for FakeStock {
    async fn stock_level(&self, location_id: i64, product_id: i64) -> Result<StockLevel, ClientError> {
        if self.failing_products.lock().unwrap().contains(&product_id) {
            return Err(ClientError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.levels
            .lock()
            .unwrap()
            .get(&(location_id, product_id))
            .map(|&stock| StockLevel {
                location_id,
                product_id,
                stock,
            })
            .ok_or_else(|| ClientError::NotFound(format!("product {} at {}", product_id, location_id)))
    }
}

#[derive(Default)]
pub struct FakePayments {
    requests: Mutex<Vec<PaymentRequest>>,
    failing: AtomicBool,
}

impl FakePayments {
    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentSession, ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 500,
                body: "snap down".into(),
            });
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(PaymentSession {
            token: format!("snap-{}", request.order_code),
            redirect_url: None,
        })
    }
}

#[derive(Default)]
pub struct FakeUsers {
    users: Mutex<HashMap<i64, UserProfile>>,
}

impl FakeUsers {
    pub fn add(&self, id: i64, roles: &[&str]) {
        self.users.lock().unwrap().insert(
            id,
            UserProfile {
                id,
                name: format!("User {}", id),
                email: format!("user{}@example.com", id),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn get_user(&self, id: i64) -> Result<UserProfile, ClientError> {
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("user {}", id)))
    }
}

#[derive(Default)]
pub struct FakeLocations {
    locations: Mutex<HashMap<i64, Location>>,
}

impl FakeLocations {
    pub fn add(&self, id: i64, keeper_id: Option<i64>) {
        self.locations.lock().unwrap().insert(
            id,
            Location {
                id,
                name: format!("Merchant {}", id),
                address: String::new(),
                phone: String::new(),
                keeper_id,
            },
        );
    }
}

#[async_trait]
impl LocationDirectory for FakeLocations {
    async fn get_location(&self, id: i64) -> Result<Location, ClientError> {
        self.locations
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("merchant {}", id)))
    }
}

/// Knows every product except id 404.
pub struct FakeCatalog;

#[async_trait]
impl ProductCatalog for FakeCatalog {
    async fn get_product(&self, id: i64) -> Result<Product, ClientError> {
        if id == 404 {
            return Err(ClientError::NotFound(format!("product {}", id)));
        }
        Ok(Product {
            id,
            name: format!("Product {}", id),
            barcode: String::new(),
            price: 0,
        })
    }

    async fn get_product_by_barcode(&self, barcode: &str) -> Result<Product, ClientError> {
        Err(ClientError::NotFound(format!("barcode {}", barcode)))
    }
}

#[derive(Default)]
pub struct MemoryOutbox {
    messages: Mutex<Vec<(OutboxMessage, bool)>>,
    retry_at: Mutex<HashMap<i64, tokio::time::Instant>>,
}

impl MemoryOutbox {
    pub fn push(&self, routing_key: &str, payload: serde_json::Value) {
        let mut messages = self.messages.lock().unwrap();
        let id = messages.len() as i64 + 1;
        messages.push((
            OutboxMessage {
                id,
                event_id: Uuid::new_v4(),
                routing_key: routing_key.to_string(),
                payload,
                attempts: 0,
            },
            false,
        ));
    }

    pub fn pending(&self) -> usize {
        self.messages.lock().unwrap().iter().filter(|(_, published)| !published).count()
    }

    pub fn attempts_of(&self, id: i64) -> Option<i32> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .find(|(m, _)| m.id == id)
            .map(|(m, _)| m.attempts)
    }
}

#[async_trait]
impl OutboxStore for MemoryOutbox {
    async fn claim_batch(&self, limit: i64) -> RepositoryResult<Vec<OutboxMessage>> {
        let now = tokio::time::Instant::now();
        let retry_at = self.retry_at.lock().unwrap();
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, published)| !published)
            .filter(|(m, _)| retry_at.get(&m.id).map_or(true, |at| *at <= now))
            .take(limit as usize)
            .map(|(m, _)| m.clone())
            .collect())
    }

    async fn mark_published(&self, id: i64) -> RepositoryResult<()> {
        if let Some(entry) = self.messages.lock().unwrap().iter_mut().find(|(m, _)| m.id == id) {
            entry.1 = true;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, _error: &str, retry_in: Duration) -> RepositoryResult<()> {
        if let Some(entry) = self.messages.lock().unwrap().iter_mut().find(|(m, _)| m.id == id) {
            entry.0.attempts += 1;
        }
        self.retry_at
            .lock()
            .unwrap()
            .insert(id, tokio::time::Instant::now() + retry_in);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> Result<(), BusError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BusError::Publish("broker unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((routing_key.to_string(), payload.to_vec()));
        Ok(())
    }
}

pub fn arc<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
