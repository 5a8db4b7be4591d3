//! Compact HMAC-SHA256 signed tokens.
//!
//! The same three-segment format (`header.claims.signature`, URL-safe base64
//! without padding) carries both end-user credentials and the internal trust
//! token that services attach to calls made through the gateway.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::auth::identity::{SYSTEM_EMAIL, SYSTEM_ROLE};
use crate::config::TokenConfig;

type HmacSha256 = Hmac<Sha256>;

pub const INTERNAL_SUBJECT: &str = "internal-service";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("failed to encode token: {0}")]
    Encoding(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub email: String,
    pub roles: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub sub: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Issues and verifies tokens with one shared secret.
#[derive(Debug, Clone)]
pub struct TokenSigner {
    secret: String,
    issuer: String,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(config: &TokenConfig) -> Self {
        Self::with_lifetime(
            config.secret.clone(),
            config.issuer.clone(),
            Duration::hours(config.lifetime_hours),
        )
    }

    pub fn with_lifetime(secret: String, issuer: String, lifetime: Duration) -> Self {
        Self {
            secret,
            issuer,
            lifetime,
        }
    }

    /// Token asserting the system identity, attached to every internal call.
    pub fn issue_internal(&self) -> Result<String, TokenError> {
        self.issue(0, SYSTEM_EMAIL, SYSTEM_ROLE, INTERNAL_SUBJECT)
    }

    pub fn issue_for_user(&self, user_id: i64, email: &str, roles: &str) -> Result<String, TokenError> {
        self.issue(user_id, email, roles, &user_id.to_string())
    }

    fn issue(&self, user_id: i64, email: &str, roles: &str, subject: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            email: email.to_string(),
            roles: roles.to_string(),
            exp: (now + self.lifetime).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            sub: subject.to_string(),
        };
        sign(&claims, &self.secret)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        verify(token, &self.secret)
    }
}

pub fn sign(claims: &Claims, secret: &str) -> Result<String, TokenError> {
    let header = Header {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let header = serde_json::to_vec(&header).map_err(|e| TokenError::Encoding(e.to_string()))?;
    let payload = serde_json::to_vec(claims).map_err(|e| TokenError::Encoding(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = URL_SAFE_NO_PAD.encode(mac(secret, &signing_input)?.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    verify_at(token, secret, Utc::now().timestamp())
}

pub(crate) fn verify_at(token: &str, secret: &str, now: i64) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = segments.as_slice() else {
        return Err(TokenError::Malformed);
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;

    // verify_slice compares in constant time
    mac(secret, &format!("{}.{}", header, payload))?
        .verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

    if now > claims.exp {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn mac(secret: &str, input: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TokenError::Encoding(e.to_string()))?;
    mac.update(input.as_bytes());
    Ok(mac)
}
