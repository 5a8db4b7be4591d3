//! Edge of the system: terminates end-user tokens, enforces request ceilings
//! and forwards everything else to the owning domain service.

pub mod auth;
pub mod client_ip;
pub mod login;
pub mod proxy;
pub mod rate_limit;

use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::TokenSigner;
use crate::cache::KeyValueStore;
use crate::clients::REQUEST_TIMEOUT;
use crate::config::{Config, RateLimitConfig};
use crate::health::{health_handler, HealthRegistry};
use crate::middleware::{request_logger_middleware, RequestLogSettings};

pub use proxy::ForwardingTable;
pub use rate_limit::RateLimiter;

#[derive(Clone)]
pub struct GatewayState {
    pub gateway_name: Arc<str>,
    pub signer: Arc<TokenSigner>,
    pub limiter: RateLimiter,
    pub rate_limits: RateLimitConfig,
    pub trusted_proxy_depth: usize,
    pub routes: Arc<ForwardingTable>,
    pub user_service_url: String,
    pub http: reqwest::Client,
}

impl GatewayState {
    pub fn new(config: &Config, store: Arc<dyn KeyValueStore>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            gateway_name: Arc::from(config.gateway.name.as_str()),
            signer: Arc::new(TokenSigner::new(&config.token)),
            limiter: RateLimiter::new(store, config.rate_limit.window),
            rate_limits: config.rate_limit.clone(),
            trusted_proxy_depth: config.gateway.trusted_proxy_depth,
            routes: Arc::new(ForwardingTable::new(&config.gateway.services)),
            user_service_url: config.gateway.services.user.trim_end_matches('/').to_string(),
            http,
        }
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
}

pub fn router(state: GatewayState, health: Arc<HealthRegistry>, logging: RequestLogSettings) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_handler))
        .with_state(health);

    Router::new()
        .route("/api/v1/auth/login", post(login::login))
        .fallback(proxy::proxy)
        .layer(middleware::from_fn_with_state(state.clone(), auth::authenticate))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit))
        .with_state(state)
        .merge(health_routes)
        .layer(cors())
        .layer(middleware::from_fn_with_state(logging, request_logger_middleware))
}
