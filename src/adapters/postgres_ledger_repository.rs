//! Postgres implementation of the stock ledgers for merchants and warehouses.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::adapters::postgres_outbox::insert_outbox;
use crate::domain::{
    LedgerLocation, Location, LocationKind, ReductionOutcome, StockLevel, StockReducedEvent,
};
use crate::ports::{
    FailedEvent, LedgerRepository, LocationRepository, RepositoryError, RepositoryResult,
};

#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn stock_table(kind: LocationKind) -> (&'static str, &'static str) {
    match kind {
        LocationKind::Merchant => ("merchant_products", "merchant_id"),
        LocationKind::Warehouse => ("warehouse_products", "warehouse_id"),
    }
}

async fn current_stock(
    conn: &mut PgConnection,
    location: LedgerLocation,
    product_id: i64,
) -> RepositoryResult<Option<i64>> {
    let (table, column) = stock_table(location.kind);
    let stock = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT stock FROM {} WHERE {} = $1 AND product_id = $2",
        table, column
    ))
    .bind(location.id)
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(stock)
}

/// Decrements one row only when enough stock remains. On refusal the current
/// level is read back to tell a missing row from a short one.
async fn conditional_decrement(
    conn: &mut PgConnection,
    location: LedgerLocation,
    product_id: i64,
    quantity: i64,
) -> RepositoryResult<StockLevel> {
    let (table, column) = stock_table(location.kind);
    let remaining = sqlx::query_scalar::<_, i64>(&format!(
        r#"
        UPDATE {table}
        SET stock = stock - $3, updated_at = NOW()
        WHERE {column} = $1 AND product_id = $2 AND stock >= $3
        RETURNING stock
        "#,
        table = table,
        column = column
    ))
    .bind(location.id)
    .bind(product_id)
    .bind(quantity)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(stock) = remaining {
        return Ok(StockLevel {
            location_id: location.id,
            product_id,
            stock,
        });
    }

    match current_stock(conn, location, product_id).await? {
        None => Err(RepositoryError::NotFound(format!(
            "product {} at {}",
            product_id, location
        ))),
        Some(available) => Err(RepositoryError::InsufficientStock {
            product_id,
            required: quantity,
            available,
        }),
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    async fn stock_level(&self, location: LedgerLocation, product_id: i64) -> RepositoryResult<StockLevel> {
        let mut conn = self.pool.acquire().await?;
        current_stock(&mut *conn, location, product_id)
            .await?
            .map(|stock| StockLevel {
                location_id: location.id,
                product_id,
                stock,
            })
            .ok_or_else(|| RepositoryError::NotFound(format!("product {} at {}", product_id, location)))
    }

    async fn reduce(&self, location: LedgerLocation, product_id: i64, quantity: i64) -> RepositoryResult<StockLevel> {
        let mut conn = self.pool.acquire().await?;
        conditional_decrement(&mut *conn, location, product_id, quantity).await
    }

    async fn apply_reduction(&self, event: &StockReducedEvent, consumer: &str) -> RepositoryResult<ReductionOutcome> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, consumer)
            VALUES ($1, $2)
            ON CONFLICT (event_id, consumer) DO NOTHING
            "#,
        )
        .bind(event.event_id)
        .bind(consumer)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ReductionOutcome::Duplicate);
        }

        // Any failing line drops `tx`, which rolls back the dedup marker and
        // every earlier line together.
        for line in &event.items {
            conditional_decrement(&mut *tx, event.location, line.product_id, line.quantity).await?;
        }

        tx.commit().await?;
        Ok(ReductionOutcome::Applied)
    }

    async fn receive_transfer(
        &self,
        merchant_id: i64,
        product_id: i64,
        quantity: i64,
        event: &StockReducedEvent,
    ) -> RepositoryResult<StockLevel> {
        let mut tx = self.pool.begin().await?;

        let stock = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO merchant_products (merchant_id, product_id, stock)
            VALUES ($1, $2, $3)
            ON CONFLICT (merchant_id, product_id)
            DO UPDATE SET stock = merchant_products.stock + EXCLUDED.stock, updated_at = NOW()
            RETURNING stock
            "#,
        )
        .bind(merchant_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        insert_outbox(&mut *tx, event).await?;
        tx.commit().await?;

        Ok(StockLevel {
            location_id: merchant_id,
            product_id,
            stock,
        })
    }

    async fn record_failure(&self, failure: &FailedEvent) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_event_failures (event_id, consumer, routing_key, payload, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(failure.event_id)
        .bind(&failure.consumer)
        .bind(&failure.routing_key)
        .bind(&failure.payload)
        .bind(&failure.reason)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_failure(&self, event_id: Uuid) -> RepositoryResult<FailedEvent> {
        let row = sqlx::query_as::<_, FailureRow>(
            r#"
            SELECT event_id, consumer, routing_key, payload, reason
            FROM stock_event_failures
            WHERE event_id = $1
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(FailureRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("failed event {}", event_id)))
    }
}

#[async_trait]
impl LocationRepository for PostgresLedgerRepository {
    async fn find_location(&self, location: LedgerLocation) -> RepositoryResult<Location> {
        let query = match location.kind {
            LocationKind::Merchant => {
                "SELECT id, name, address, phone, keeper_id FROM merchants WHERE id = $1"
            }
            LocationKind::Warehouse => {
                "SELECT id, name, address, phone, NULL::BIGINT AS keeper_id FROM warehouses WHERE id = $1"
            }
        };

        sqlx::query_as::<_, LocationRow>(query)
            .bind(location.id)
            .fetch_optional(&self.pool)
            .await?
            .map(LocationRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(location.to_string()))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FailureRow {
    event_id: Uuid,
    consumer: String,
    routing_key: String,
    payload: serde_json::Value,
    reason: String,
}

impl FailureRow {
    fn into_domain(self) -> FailedEvent {
        FailedEvent {
            event_id: self.event_id,
            consumer: self.consumer,
            routing_key: self.routing_key,
            payload: self.payload,
            reason: self.reason,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: i64,
    name: String,
    address: String,
    phone: String,
    keeper_id: Option<i64>,
}

impl LocationRow {
    fn into_domain(self) -> Location {
        Location {
            id: self.id,
            name: self.name,
            address: self.address,
            phone: self.phone,
            keeper_id: self.keeper_id,
        }
    }
}
