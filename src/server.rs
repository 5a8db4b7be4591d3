//! Process startup per role: build the adapters, inject them into the use
//! cases, spawn background loops and serve HTTP.

use axum::Router;
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::adapters::{PostgresLedgerRepository, PostgresOutbox, PostgresTransactionRepository};
use crate::app::{ledger_router, transaction_router, LedgerState, TransactionState};
use crate::auth::TokenSigner;
use crate::cache::{KeyValueStore, RedisStore};
use crate::clients::{
    CachedDirectory, InternalClient, MerchantClient, MidtransClient, ProductClient, UserClient,
    WarehouseClient,
};
use crate::config::{Config, ServiceRole};
use crate::db;
use crate::domain::LocationKind;
use crate::events::{AmqpBus, OutboxDispatcher, StockConsumer};
use crate::gateway::{self, GatewayState};
use crate::health::{AmqpChecker, HealthRegistry, PostgresChecker, RedisChecker};
use crate::middleware::RequestLogSettings;
use crate::ports::LocationDirectory;
use crate::startup::validate_environment;
use crate::use_cases::{
    CreateTransaction, Dashboard, HandlePaymentNotification, ReduceStock, TransactionQueries,
    TransferStock,
};

pub async fn serve(role: ServiceRole, config: Config) -> anyhow::Result<()> {
    let pool = if role.needs_database() {
        let pool = db::create_pool(config.require_database_url()?).await?;
        db::run_migrations(&pool).await?;
        Some(pool)
    } else {
        None
    };

    let report = validate_environment(role, &config, pool.as_ref()).await;
    report.log();
    if !report.is_valid() {
        anyhow::bail!("startup validation failed for the {} role", role);
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(RedisStore::new(&config.redis_url)?);
    let logging = RequestLogSettings {
        log_body: config.log_request_body,
    };

    let app = match (role, pool) {
        (ServiceRole::Gateway, _) => {
            let health = HealthRegistry::new(role.as_str())
                .with("redis", false, Arc::new(RedisChecker::new(store.clone())));
            gateway::router(GatewayState::new(&config, store), Arc::new(health), logging)
        }
        (ServiceRole::Transaction, Some(pool)) => transaction_app(&config, pool, store, logging).await?,
        (ServiceRole::Merchant, Some(pool)) => {
            ledger_app(&config, LocationKind::Merchant, pool, store, logging).await?
        }
        (ServiceRole::Warehouse, Some(pool)) => {
            ledger_app(&config, LocationKind::Warehouse, pool, store, logging).await?
        }
        (_, None) => anyhow::bail!("the {} role needs a database", role),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!(role = %role, "listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(role = %role, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn internal_client(config: &Config, signer: &Arc<TokenSigner>) -> InternalClient {
    InternalClient::new(
        config.gateway.api_gateway_url.clone(),
        config.gateway.name.clone(),
        signer.clone(),
    )
}

/// Relays outbox rows written by this role to the broker.
fn spawn_dispatcher(config: &Config, pool: &PgPool, bus: &AmqpBus) {
    let dispatcher = OutboxDispatcher::new(
        Arc::new(PostgresOutbox::new(pool.clone())),
        Arc::new(bus.clone()),
        config.outbox.batch_size,
        config.outbox.poll_interval,
    );
    tokio::spawn(dispatcher.run());
}

fn domain_health(role: &str, pool: &PgPool, store: &Arc<dyn KeyValueStore>, bus: &AmqpBus) -> HealthRegistry {
    HealthRegistry::new(role)
        .with("postgres", true, Arc::new(PostgresChecker::new(pool.clone())))
        .with("redis", false, Arc::new(RedisChecker::new(store.clone())))
        .with("rabbitmq", false, Arc::new(AmqpChecker::new(bus.clone())))
}

async fn transaction_app(
    config: &Config,
    pool: PgPool,
    store: Arc<dyn KeyValueStore>,
    logging: RequestLogSettings,
) -> anyhow::Result<Router> {
    let signer = Arc::new(TokenSigner::new(&config.token));
    let bus = AmqpBus::connect(&config.amqp_url).await?;
    let ttl = config.metadata_cache_ttl;

    let merchants = MerchantClient::new(internal_client(config, &signer));
    let merchant_directory: Arc<dyn LocationDirectory> = Arc::new(CachedDirectory::new(
        merchants.clone(),
        store.clone(),
        "merchant",
        ttl,
    ));
    let transactions = Arc::new(PostgresTransactionRepository::new(pool.clone()));

    let state = TransactionState {
        create: Arc::new(CreateTransaction::new(
            Arc::new(merchants),
            transactions.clone(),
            Arc::new(MidtransClient::new(&config.midtrans)),
        )),
        queries: Arc::new(TransactionQueries::new(
            transactions.clone(),
            Arc::new(CachedDirectory::new(
                ProductClient::new(internal_client(config, &signer)),
                store.clone(),
                "product",
                ttl,
            )),
            merchant_directory.clone(),
        )),
        callback: Arc::new(HandlePaymentNotification::new(
            transactions.clone(),
            config.midtrans.server_key.clone(),
        )),
        dashboard: Arc::new(Dashboard::new(
            Arc::new(UserClient::new(internal_client(config, &signer))),
            merchant_directory,
            transactions,
        )),
    };

    spawn_dispatcher(config, &pool, &bus);

    let health = domain_health("transaction", &pool, &store, &bus);
    Ok(transaction_router(
        state,
        Arc::from(config.gateway.name.as_str()),
        Arc::new(health),
        logging,
    ))
}

async fn ledger_app(
    config: &Config,
    kind: LocationKind,
    pool: PgPool,
    store: Arc<dyn KeyValueStore>,
    logging: RequestLogSettings,
) -> anyhow::Result<Router> {
    let bus = AmqpBus::connect(&config.amqp_url).await?;
    let ledger = Arc::new(PostgresLedgerRepository::new(pool.clone()));

    let consumer_name = format!("{}-service", kind.as_str());
    let reducer = Arc::new(ReduceStock::new(ledger.clone(), consumer_name, kind));
    let consumer = match kind {
        LocationKind::Merchant => StockConsumer::merchant(bus.clone(), reducer),
        LocationKind::Warehouse => StockConsumer::warehouse(bus.clone(), reducer),
    };
    tokio::spawn(consumer.run());

    // Only merchants originate events (stock transfers from a warehouse).
    let transfer = match kind {
        LocationKind::Merchant => {
            let signer = Arc::new(TokenSigner::new(&config.token));
            let warehouses = WarehouseClient::new(internal_client(config, &signer));
            spawn_dispatcher(config, &pool, &bus);
            Some(Arc::new(TransferStock::new(Arc::new(warehouses), ledger.clone())))
        }
        LocationKind::Warehouse => None,
    };

    let state = LedgerState {
        kind,
        locations: ledger.clone(),
        ledger,
    };
    let health = domain_health(kind.as_str(), &pool, &store, &bus);

    Ok(ledger_router(
        state,
        transfer,
        Arc::from(config.gateway.name.as_str()),
        Arc::new(health),
        logging,
    ))
}
