//! HTTP surface of the three domain roles. Every API route sits behind the
//! gateway guard; `/health` stays reachable for orchestrators.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::domain::LocationKind;
use crate::handlers::{callback, dashboard, locations, transactions, transfers};
use crate::health::{health_handler, HealthRegistry};
use crate::middleware::{gateway_guard, request_logger_middleware, RequestLogSettings};
use crate::ports::{LedgerRepository, LocationRepository};
use crate::use_cases::{
    CreateTransaction, Dashboard, HandlePaymentNotification, TransactionQueries, TransferStock,
};

#[derive(Clone)]
pub struct TransactionState {
    pub create: Arc<CreateTransaction>,
    pub queries: Arc<TransactionQueries>,
    pub callback: Arc<HandlePaymentNotification>,
    pub dashboard: Arc<Dashboard>,
}

/// Read side of a merchant or warehouse ledger.
#[derive(Clone)]
pub struct LedgerState {
    pub kind: LocationKind,
    pub locations: Arc<dyn LocationRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
}

pub fn transaction_router(
    state: TransactionState,
    gateway_name: Arc<str>,
    health: Arc<HealthRegistry>,
    logging: RequestLogSettings,
) -> Router {
    let api = Router::new()
        .route(
            "/api/v1/transactions",
            post(transactions::create_transaction).get(transactions::list_transactions),
        )
        .route("/api/v1/transactions/:id", get(transactions::get_transaction))
        .route("/api/v1/midtrans/callback", post(callback::midtrans_callback))
        .route("/api/v1/dashboard/manager", get(dashboard::manager_dashboard))
        .route(
            "/api/v1/dashboard/keeper/merchant/:merchant_id",
            get(dashboard::keeper_dashboard),
        )
        .with_state(state);

    guarded(api, gateway_name, health, logging)
}

/// Merchant and warehouse routers differ only in their path prefix and in the
/// merchant-only transfer endpoint.
pub fn ledger_router(
    state: LedgerState,
    transfer: Option<Arc<TransferStock>>,
    gateway_name: Arc<str>,
    health: Arc<HealthRegistry>,
    logging: RequestLogSettings,
) -> Router {
    let prefix = match state.kind {
        LocationKind::Merchant => "/api/v1/merchants",
        LocationKind::Warehouse => "/api/v1/warehouses",
    };

    let mut api = Router::new()
        .route(&format!("{}/:id", prefix), get(locations::get_location))
        .route(
            &format!("{}/:id/products/:product_id/stock", prefix),
            get(locations::get_stock),
        )
        .with_state(state);

    if let Some(transfer) = transfer {
        api = api.merge(
            Router::new()
                .route("/api/v1/merchant-products/transfers", post(transfers::create_transfer))
                .with_state(transfer),
        );
    }

    guarded(api, gateway_name, health, logging)
}

fn guarded(
    api: Router,
    gateway_name: Arc<str>,
    health: Arc<HealthRegistry>,
    logging: RequestLogSettings,
) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_handler))
        .with_state(health);

    api.layer(middleware::from_fn_with_state(gateway_name, gateway_guard))
        .merge(health_routes)
        .layer(middleware::from_fn_with_state(logging, request_logger_middleware))
}
