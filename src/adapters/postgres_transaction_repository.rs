//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;

use crate::adapters::postgres_outbox::insert_outbox;
use crate::domain::{
    DashboardStats, NewTransaction, PaymentStatus, PaymentUpdate, PaymentUpdateOutcome,
    StockReducedEvent, Transaction, TransactionProduct,
};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

const TRANSACTION_COLUMNS: &str = "id, name, phone, email, address, sub_total, tax_total, grand_total, \
     merchant_id, payment_status, payment_method, order_code, provider_transaction_id, \
     payment_token, fraud_status, notes, currency, created_at, updated_at";

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_products(&self, ids: &[i64]) -> RepositoryResult<HashMap<i64, Vec<TransactionProduct>>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, transaction_id, product_id, quantity, price, sub_total
            FROM transaction_products
            WHERE transaction_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_transaction: HashMap<i64, Vec<TransactionProduct>> = HashMap::new();
        for row in rows {
            by_transaction
                .entry(row.transaction_id)
                .or_default()
                .push(row.into_domain());
        }
        Ok(by_transaction)
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn create(&self, new: &NewTransaction, event: &StockReducedEvent) -> RepositoryResult<Transaction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                name, phone, email, address, sub_total, tax_total, grand_total,
                merchant_id, payment_status, payment_method, order_code, notes, currency
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11, $12)
            RETURNING {}
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(&new.customer.name)
        .bind(&new.customer.phone)
        .bind(&new.customer.email)
        .bind(&new.customer.address)
        .bind(new.totals.sub_total)
        .bind(new.totals.tax_total)
        .bind(new.totals.grand_total)
        .bind(new.merchant_id)
        .bind(&new.payment_method)
        .bind(&new.order_code)
        .bind(&new.notes)
        .bind(&new.currency)
        .fetch_one(&mut *tx)
        .await?;

        let mut products = Vec::with_capacity(new.items.len());
        for item in &new.items {
            let line = sqlx::query_as::<_, ProductRow>(
                r#"
                INSERT INTO transaction_products (transaction_id, product_id, quantity, price, sub_total)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, transaction_id, product_id, quantity, price, sub_total
                "#,
            )
            .bind(row.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.sub_total())
            .fetch_one(&mut *tx)
            .await?;
            products.push(line.into_domain());
        }

        insert_outbox(&mut *tx, event).await?;
        tx.commit().await?;

        row.into_domain(products)
    }

    async fn set_payment_token(&self, id: i64, token: &str) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE transactions SET payment_token = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("transaction {}", id)));
        }
        Ok(())
    }

    async fn get_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        let mut products = self.load_products(&[id]).await?;
        row.into_domain(products.remove(&id).unwrap_or_default())
    }

    async fn list(&self, merchant_id: Option<i64>, limit: i64, offset: i64) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE ($1::BIGINT IS NULL OR merchant_id = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(merchant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut products = self.load_products(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let lines = products.remove(&row.id).unwrap_or_default();
                row.into_domain(lines)
            })
            .collect()
    }

    async fn apply_payment_update(&self, order_code: &str, update: &PaymentUpdate) -> RepositoryResult<PaymentUpdateOutcome> {
        // The status guard lives in the WHERE clause so two racing callbacks
        // cannot both move a pending order.
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE transactions
            SET payment_status = $2,
                payment_method = COALESCE($3, payment_method),
                provider_transaction_id = COALESCE($4, provider_transaction_id),
                fraud_status = COALESCE($5, fraud_status),
                updated_at = NOW()
            WHERE order_code = $1
              AND (payment_status = 'pending' OR payment_status = $2)
            RETURNING id
            "#,
        )
        .bind(order_code)
        .bind(update.status.as_str())
        .bind(&update.payment_method)
        .bind(&update.provider_transaction_id)
        .bind(&update.fraud_status)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(PaymentUpdateOutcome::Applied);
        }

        let current: Option<String> =
            sqlx::query_scalar("SELECT payment_status FROM transactions WHERE order_code = $1")
                .bind(order_code)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            None => Err(RepositoryError::NotFound(format!("order {}", order_code))),
            Some(status) => Ok(PaymentUpdateOutcome::Ignored {
                current: status.parse().map_err(RepositoryError::Serialization)?,
            }),
        }
    }

    async fn dashboard_stats(&self, merchant_id: Option<i64>) -> RepositoryResult<DashboardStats> {
        let (total_revenue, total_transactions): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(grand_total), 0)::BIGINT, COUNT(*)
            FROM transactions
            WHERE payment_status = 'success'
              AND ($1::BIGINT IS NULL OR merchant_id = $1)
            "#,
        )
        .bind(merchant_id)
        .fetch_one(&self.pool)
        .await?;

        let total_products_sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(tp.quantity), 0)::BIGINT
            FROM transaction_products tp
            JOIN transactions t ON t.id = tp.transaction_id
            WHERE t.payment_status = 'success'
              AND ($1::BIGINT IS NULL OR t.merchant_id = $1)
            "#,
        )
        .bind(merchant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            total_revenue,
            total_transactions,
            total_products_sold,
        })
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    name: String,
    phone: String,
    email: String,
    address: String,
    sub_total: i64,
    tax_total: i64,
    grand_total: i64,
    merchant_id: i64,
    payment_status: String,
    payment_method: String,
    order_code: String,
    provider_transaction_id: Option<String>,
    payment_token: Option<String>,
    fraud_status: Option<String>,
    notes: String,
    currency: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self, products: Vec<TransactionProduct>) -> RepositoryResult<Transaction> {
        let payment_status: PaymentStatus = self
            .payment_status
            .parse()
            .map_err(RepositoryError::Serialization)?;

        Ok(Transaction {
            id: self.id,
            name: self.name,
            phone: self.phone,
            email: self.email,
            address: self.address,
            sub_total: self.sub_total,
            tax_total: self.tax_total,
            grand_total: self.grand_total,
            merchant_id: self.merchant_id,
            merchant_name: None,
            payment_status,
            payment_method: self.payment_method,
            order_code: self.order_code,
            provider_transaction_id: self.provider_transaction_id,
            payment_token: self.payment_token,
            fraud_status: self.fraud_status,
            notes: self.notes,
            currency: self.currency,
            created_at: self.created_at,
            updated_at: self.updated_at,
            products,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    transaction_id: i64,
    product_id: i64,
    quantity: i64,
    price: i64,
    sub_total: i64,
}

impl ProductRow {
    fn into_domain(self) -> TransactionProduct {
        TransactionProduct {
            id: self.id,
            transaction_id: self.transaction_id,
            product_id: self.product_id,
            quantity: self.quantity,
            price: self.price,
            sub_total: self.sub_total,
            product_name: None,
        }
    }
}
