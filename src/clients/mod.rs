//! Typed HTTP clients for calls between services. Every call goes through the
//! gateway carrying the internal trust token and the sentinel header pair.
//! Failures are returned to the caller; nothing here retries.

pub mod cached;
pub mod merchant;
pub mod midtrans;
pub mod product;
pub mod user;
pub mod warehouse;

pub use cached::CachedDirectory;
pub use merchant::MerchantClient;
pub use midtrans::MidtransClient;
pub use product::ProductClient;
pub use user::UserClient;
pub use warehouse::WarehouseClient;

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::identity::{HEADER_GATEWAY, HEADER_INTERNAL_REQUEST};
use crate::auth::TokenSigner;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
    #[error("Failed to sign internal token: {0}")]
    Token(String),
}

impl ClientError {
    /// Counts against the circuit breaker. A 404 means the service answered.
    fn is_upstream_failure(&self) -> bool {
        !matches!(self, ClientError::NotFound(_))
    }
}

/// Standard response envelope of every service.
#[derive(Debug, Deserialize, Serialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    pub data: T,
}

#[derive(Clone)]
pub struct InternalClient {
    client: Client,
    base_url: String,
    gateway_name: String,
    signer: Arc<TokenSigner>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl InternalClient {
    pub fn new(base_url: String, gateway_name: String, signer: Arc<TokenSigner>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gateway_name,
            signer,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// GETs `path` and unwraps the `data` field of the envelope.
    pub async fn get_data<T>(&self, path: &str, what: &str) -> Result<T, ClientError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let token = self
            .signer
            .issue_internal()
            .map_err(|e| ClientError::Token(e.to_string()))?;
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(HEADER_INTERNAL_REQUEST, "true")
            .header(HEADER_GATEWAY, self.gateway_name.as_str());
        let what = what.to_string();

        let result = self
            .circuit_breaker
            .call_with(
                |e: &ClientError| e.is_upstream_failure(),
                async move {
                    let response = request.send().await?;
                    let status = response.status();

                    if status == StatusCode::NOT_FOUND {
                        return Err(ClientError::NotFound(what));
                    }
                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ClientError::Status {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    let envelope = response
                        .json::<Envelope<T>>()
                        .await
                        .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                    Ok(envelope.data)
                },
            )
            .await;

        match result {
            Ok(data) => Ok(data),
            Err(FailsafeError::Rejected) => Err(ClientError::CircuitOpen(self.base_url.clone())),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_signer() -> Arc<TokenSigner> {
    Arc::new(TokenSigner::with_lifetime(
        "test-secret".to_string(),
        "micro-warehouse".to_string(),
        chrono::Duration::hours(1),
    ))
}
