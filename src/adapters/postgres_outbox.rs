//! Transactional outbox backed by the `outbox_events` table.

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::StockReducedEvent;
use crate::ports::{OutboxMessage, OutboxStore, RepositoryError, RepositoryResult};

const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Queues `event` on the caller's open transaction so it commits (or rolls
/// back) with the state change that produced it.
pub async fn insert_outbox(conn: &mut PgConnection, event: &StockReducedEvent) -> RepositoryResult<()> {
    let payload =
        serde_json::to_value(event).map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO outbox_events (event_id, routing_key, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(event.event_id)
    .bind(event.routing_key())
    .bind(payload)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
    lease: Duration,
}

impl PostgresOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    async fn claim_batch(&self, limit: i64) -> RepositoryResult<Vec<OutboxMessage>> {
        // Rows stay leased until `locked_until`; a crashed dispatcher's rows
        // become claimable again once the lease runs out.
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE outbox_events
            SET locked_until = NOW() + make_interval(secs => $2)
            WHERE id IN (
                SELECT id FROM outbox_events
                WHERE published_at IS NULL
                  AND (locked_until IS NULL OR locked_until < NOW())
                ORDER BY id
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, event_id, routing_key, payload, attempts
            "#,
        )
        .bind(limit)
        .bind(self.lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<OutboxMessage> = rows.into_iter().map(OutboxRow::into_domain).collect();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn mark_published(&self, id: i64) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE outbox_events SET published_at = NOW(), locked_until = NULL, last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str, retry_in: Duration) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE outbox_events
            SET attempts = attempts + 1,
                last_error = $2,
                locked_until = NOW() + make_interval(secs => $3)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_in.as_secs_f64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    event_id: Uuid,
    routing_key: String,
    payload: serde_json::Value,
    attempts: i32,
}

impl OutboxRow {
    fn into_domain(self) -> OutboxMessage {
        OutboxMessage {
            id: self.id,
            event_id: self.event_id,
            routing_key: self.routing_key,
            payload: self.payload,
            attempts: self.attempts,
        }
    }
}
