use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::PostgresLedgerRepository;
use crate::config::{Config, ServiceRole};
use crate::domain::LedgerLocation;
use crate::events::AmqpBus;
use crate::ports::{EventPublisher, LedgerRepository};
use crate::use_cases::ReduceStock;

#[derive(Parser)]
#[command(name = "warehouse-core")]
#[command(about = "Warehouse Core - gateway, order and stock ledger services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one service role
    Serve {
        #[arg(value_enum)]
        role: ServiceRole,
    },

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration with secrets masked
    Config,

    /// Stock ledger reconciliation
    #[command(subcommand)]
    Stock(StockCommands),

    /// Stock event maintenance
    #[command(subcommand)]
    Events(EventCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum StockCommands {
    /// Apply one conditional decrement to a ledger row
    Reduce {
        /// `merchant:<id>` or `warehouse:<id>`
        #[arg(long)]
        location: LedgerLocation,
        #[arg(long)]
        product: i64,
        #[arg(long)]
        quantity: i64,
    },
}

#[derive(Subcommand)]
pub enum EventCommands {
    /// Re-publish a dead-lettered stock event with the same event id
    Replay {
        #[arg(value_name = "EVENT_ID")]
        event_id: Uuid,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config.require_database_url()?).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;
    println!("Database migrations completed");

    Ok(())
}

pub fn handle_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config.database_url.as_deref().map(mask_password).unwrap_or_else(|| "(unset)".to_string())
    );
    println!("  Redis URL: {}", mask_password(&config.redis_url));
    println!("  AMQP URL: {}", mask_password(&config.amqp_url));
    println!("  Gateway Name: {}", config.gateway.name);
    println!("  API Gateway URL: {}", config.gateway.api_gateway_url);
    println!("  Trusted Proxy Depth: {}", config.gateway.trusted_proxy_depth);

    let services = &config.gateway.services;
    println!("  Services:");
    println!("    user: {}", services.user);
    println!("    product: {}", services.product);
    println!("    merchant: {}", services.merchant);
    println!("    warehouse: {}", services.warehouse);
    println!("    transaction: {}", services.transaction);
    println!("    notification: {}", services.notification);

    println!("  Token Secret: {}", mask_secret(&config.token.secret));
    println!("  Token Issuer: {}", config.token.issuer);
    println!("  Token Lifetime: {}h", config.token.lifetime_hours);
    println!(
        "  Rate Limits: global {} / auth {} / api {} per {}s",
        config.rate_limit.global_max,
        config.rate_limit.auth_max,
        config.rate_limit.api_max,
        config.rate_limit.window.as_secs()
    );
    println!("  Midtrans Server Key: {}", mask_secret(&config.midtrans.server_key));
    println!("  Midtrans Production: {}", config.midtrans.is_production);
    println!(
        "  Outbox: batch {} every {}ms",
        config.outbox.batch_size,
        config.outbox.poll_interval.as_millis()
    );
    println!("  Metadata Cache TTL: {}s", config.metadata_cache_ttl.as_secs());

    Ok(())
}

pub async fn handle_stock_reduce(
    config: &Config,
    location: LedgerLocation,
    product_id: i64,
    quantity: i64,
) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config.require_database_url()?).await?;
    let ledger = Arc::new(PostgresLedgerRepository::new(pool));
    let reducer = ReduceStock::new(ledger, "cli", location.kind);

    let level = reducer.reduce(location, product_id, quantity).await?;
    println!(
        "Product {} at {} now has {} in stock",
        level.product_id, location, level.stock
    );

    Ok(())
}

pub async fn handle_events_replay(config: &Config, event_id: Uuid) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config.require_database_url()?).await?;
    let ledger = PostgresLedgerRepository::new(pool);

    let failure = ledger.latest_failure(event_id).await?;
    let payload = serde_json::to_vec(&failure.payload)?;

    let bus = AmqpBus::connect(&config.amqp_url).await?;
    bus.publish(&failure.routing_key, &payload).await?;

    tracing::info!(
        event_id = %event_id,
        routing_key = %failure.routing_key,
        consumer = %failure.consumer,
        "dead-lettered event replayed"
    );
    println!("Event {} re-published to {}", event_id, failure.routing_key);

    Ok(())
}

fn mask_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some() => {
            if parsed.set_password(Some("****")).is_err() {
                return raw.to_string();
            }
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

fn mask_secret(secret: &str) -> String {
    if secret.is_empty() {
        "(unset)".to_string()
    } else {
        "****".to_string()
    }
}
