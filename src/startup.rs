use crate::config::{Config, ServiceRole};
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub role: ServiceRole,
    pub environment: bool,
    /// `None` for roles without a database.
    pub database: Option<bool>,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// Redis only backs counters and a cache, both of which degrade
    /// gracefully, so it does not block startup.
    pub fn is_valid(&self) -> bool {
        self.environment && self.database.unwrap_or(true)
    }

    pub fn log(&self) {
        tracing::info!(
            role = %self.role,
            environment = status(self.environment),
            database = self.database.map(status).unwrap_or("n/a"),
            redis = status(self.redis),
            overall = if self.is_valid() { "PASS" } else { "FAIL" },
            "startup validation report"
        );
        for error in &self.errors {
            tracing::error!(role = %self.role, "{}", error);
        }
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

pub async fn validate_environment(
    role: ServiceRole,
    config: &Config,
    pool: Option<&PgPool>,
) -> ValidationReport {
    let mut report = ValidationReport {
        role,
        environment: true,
        database: pool.map(|_| true),
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(role, config) {
        report.environment = false;
        report.errors.push(format!("Environment: {:#}", e));
    }

    if let Some(pool) = pool {
        if let Err(e) = validate_database(pool).await {
            report.database = Some(false);
            report.errors.push(format!("Database: {:#}", e));
        }
    }

    if let Err(e) = validate_redis(&config.redis_url).await {
        report.redis = false;
        report.errors.push(format!("Redis: {:#}", e));
    }

    report
}

fn validate_env_vars(role: ServiceRole, config: &Config) -> Result<()> {
    if config.token.secret.trim().is_empty() {
        anyhow::bail!("JWT_SECRET_KEY is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if role.needs_database() {
        config.require_database_url()?;
    }

    url::Url::parse(&config.gateway.api_gateway_url).context("API_GATEWAY_URL is not a valid URL")?;

    match role {
        ServiceRole::Gateway => {
            let services = &config.gateway.services;
            for (name, value) in [
                ("USER_SERVICE_URL", &services.user),
                ("PRODUCT_SERVICE_URL", &services.product),
                ("MERCHANT_SERVICE_URL", &services.merchant),
                ("WAREHOUSE_SERVICE_URL", &services.warehouse),
                ("TRANSACTION_SERVICE_URL", &services.transaction),
                ("NOTIFICATION_SERVICE_URL", &services.notification),
            ] {
                url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
            }
        }
        ServiceRole::Transaction => {
            if config.midtrans.server_key.is_empty() {
                anyhow::bail!("MIDTRANS_SERVER_KEY is empty");
            }
            if let Some(base_url) = &config.midtrans.base_url {
                url::Url::parse(base_url).context("MIDTRANS_BASE_URL is not a valid URL")?;
            }
        }
        ServiceRole::Merchant | ServiceRole::Warehouse => {}
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_tokio_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}
