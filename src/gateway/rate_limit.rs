//! Fixed-window request ceilings kept in the shared counter store so every
//! gateway instance counts against the same budget.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;

use super::client_ip::extract_client_ip;
use super::GatewayState;
use crate::cache::{CacheError, KeyValueStore};
use crate::error::AppError;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Auth,
    Api,
}

impl EndpointClass {
    /// `None` for paths that only count against the global ceiling.
    pub fn for_path(path: &str) -> Option<Self> {
        if path.starts_with("/api/v1/auth") {
            Some(EndpointClass::Auth)
        } else if path.starts_with("/api/v1/midtrans/callback") {
            None
        } else if path.starts_with("/api/v1/") {
            Some(EndpointClass::Api)
        } else {
            None
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            EndpointClass::Auth => "auth",
            EndpointClass::Api => "api",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the window closes.
    pub reset_after: u64,
}

impl RateDecision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_LIMIT, HeaderValue::from(self.limit));
        headers.insert(HEADER_REMAINING, HeaderValue::from(self.remaining));
        let reset_at = chrono::Utc::now().timestamp() + self.reset_after as i64;
        headers.insert(HEADER_RESET, HeaderValue::from(reset_at));
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// Counts one hit against `key`. The first hit of a window sets the
    /// expiry; a counter found without one is given the full window again.
    pub async fn check(&self, key: &str, max: u64) -> Result<RateDecision, CacheError> {
        let count = self.store.incr(key).await?.max(0) as u64;
        if count == 1 {
            self.store.expire(key, self.window).await?;
        }

        let ttl = match self.store.ttl(key).await? {
            Some(ttl) => ttl,
            None => {
                self.store.expire(key, self.window).await?;
                self.window
            }
        };

        Ok(RateDecision {
            allowed: count <= max,
            limit: max,
            remaining: max.saturating_sub(count),
            reset_after: ttl.as_secs().max(1),
        })
    }
}

async fn decide(limiter: &RateLimiter, key: &str, max: u64) -> Option<RateDecision> {
    match limiter.check(key, max).await {
        Ok(decision) => Some(decision),
        Err(e) => {
            tracing::error!(key, error = %e, "rate limit store unavailable, admitting request");
            None
        }
    }
}

/// Applies the global per-IP ceiling and then the ceiling of the endpoint class.
pub async fn rate_limit(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let client = extract_client_ip(req.headers(), req.extensions(), state.trusted_proxy_depth)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let limits = &state.rate_limits;

    let mut decision = decide(&state.limiter, &format!("global:{}", client), limits.global_max).await;

    if decision.map(|d| d.allowed).unwrap_or(true) {
        if let Some(class) = EndpointClass::for_path(req.uri().path()) {
            let max = match class {
                EndpointClass::Auth => limits.auth_max,
                EndpointClass::Api => limits.api_max,
            };
            if let Some(class_decision) =
                decide(&state.limiter, &format!("{}:{}", class.prefix(), client), max).await
            {
                decision = Some(class_decision);
            }
        }
    }

    match decision {
        Some(d) if !d.allowed => {
            tracing::warn!(client = %client, path = %req.uri().path(), limit = d.limit, "rate limit exceeded");
            let mut response = AppError::TooManyRequests {
                retry_after: d.reset_after,
                limit: d.limit,
            }
            .into_response();
            d.write_headers(response.headers_mut());
            response
        }
        Some(d) => {
            let mut response = next.run(req).await;
            d.write_headers(response.headers_mut());
            response
        }
        None => next.run(req).await,
    }
}
