use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, Json};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::cache::KeyValueStore;
use crate::events::AmqpBus;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn from_result<E: std::fmt::Display>(result: Result<(), E>, start: Instant) -> Self {
        match result {
            Ok(()) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: e.to_string(),
            },
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ());
        DependencyStatus::from_result(result, start)
    }
}

/// Probes the shared counter store through the same interface the gateway uses.
pub struct RedisChecker {
    store: Arc<dyn KeyValueStore>,
}

impl RedisChecker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let result = self.store.exists("health:probe").await.map(|_| ());
        DependencyStatus::from_result(result, start)
    }
}

pub struct AmqpChecker {
    bus: AmqpBus,
}

impl AmqpChecker {
    pub fn new(bus: AmqpBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DependencyChecker for AmqpChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        DependencyStatus::from_result(self.bus.ping().await, start)
    }
}

struct Registered {
    name: String,
    critical: bool,
    checker: Arc<dyn DependencyChecker>,
}

/// The dependencies one role reports on `/health`.
pub struct HealthRegistry {
    service: String,
    started: Instant,
    checks: Vec<Registered>,
}

impl HealthRegistry {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            started: Instant::now(),
            checks: Vec::new(),
        }
    }

    /// A failing critical dependency makes the service `unhealthy`; any other
    /// failure only `degraded`.
    pub fn with(mut self, name: &str, critical: bool, checker: Arc<dyn DependencyChecker>) -> Self {
        self.checks.push(Registered {
            name: name.to_string(),
            critical,
            checker,
        });
        self
    }

    pub async fn check(&self) -> HealthResponse {
        let results = join_all(self.checks.iter().map(|c| async move {
            let status = timeout(CHECK_TIMEOUT, c.checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::Unhealthy {
                    status: "unhealthy".to_string(),
                    error: "timeout".to_string(),
                });
            (c, status)
        }))
        .await;

        let mut has_critical_failure = false;
        let mut has_non_critical_failure = false;
        let mut dependencies = HashMap::new();
        for (registered, status) in results {
            if matches!(status, DependencyStatus::Unhealthy { .. }) {
                if registered.critical {
                    has_critical_failure = true;
                } else {
                    has_non_critical_failure = true;
                }
            }
            dependencies.insert(registered.name.clone(), status);
        }

        let status = if has_critical_failure {
            "unhealthy"
        } else if has_non_critical_failure {
            "degraded"
        } else {
            "healthy"
        };

        HealthResponse {
            status: status.to_string(),
            service: self.service.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.started.elapsed().as_secs(),
            dependencies,
        }
    }
}

pub async fn health_handler(
    State(registry): State<Arc<HealthRegistry>>,
) -> (StatusCode, Json<HealthResponse>) {
    let report = registry.check().await;
    let code = if report.status == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report))
}
