use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderValue},
};

use crate::auth::token::Claims;
use crate::error::AppError;

pub const HEADER_INTERNAL_REQUEST: &str = "x-internal-request";
pub const HEADER_GATEWAY: &str = "x-gateway";
pub const HEADER_USER_ID: &str = "x-user-id";
pub const HEADER_USER_EMAIL: &str = "x-user-email";
pub const HEADER_USER_ROLES: &str = "x-user-roles";

pub const SYSTEM_EMAIL: &str = "system@warehouse.internal";
pub const SYSTEM_ROLE: &str = "system";

/// Who is behind the current request. Set once at the edge, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub user_id: i64,
    pub email: String,
    pub roles: String,
}

impl RequestIdentity {
    pub fn system() -> Self {
        Self {
            user_id: 0,
            email: SYSTEM_EMAIL.to_string(),
            roles: SYSTEM_ROLE.to_string(),
        }
    }

    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email.clone(),
            roles: claims.roles.clone(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == 0 && self.roles == SYSTEM_ROLE
    }

    /// Reads the `X-User-*` headers written by the gateway.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(HEADER_USER_ID)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()?;
        let email = header_str(headers, HEADER_USER_EMAIL).unwrap_or_default();
        let roles = header_str(headers, HEADER_USER_ROLES).unwrap_or_default();

        Some(Self {
            user_id,
            email,
            roles,
        })
    }

    /// Writes the identity as `X-User-*` headers, replacing whatever the client sent.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        headers.insert(HEADER_USER_ID, HeaderValue::from(self.user_id));
        for (name, value) in [(HEADER_USER_EMAIL, &self.email), (HEADER_USER_ROLES, &self.roles)] {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => {
                    headers.remove(name);
                }
            }
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// True when both sentinel headers are present and name this gateway.
pub fn has_sentinel(headers: &HeaderMap, gateway_name: &str) -> bool {
    let internal = headers
        .get(HEADER_INTERNAL_REQUEST)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let gateway = headers
        .get(HEADER_GATEWAY)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == gateway_name)
        .unwrap_or(false);

    internal && gateway
}

/// Identity placed in request extensions by the gateway, or rebuilt from the
/// forwarded headers inside a domain service.
#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<RequestIdentity>() {
            return Ok(identity.clone());
        }

        if let Some(identity) = RequestIdentity::from_headers(&parts.headers) {
            return Ok(identity);
        }

        if parts.headers.contains_key(HEADER_INTERNAL_REQUEST) {
            return Ok(RequestIdentity::system());
        }

        Err(AppError::Unauthorized("Missing caller identity".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn sentinel_requires_both_headers() {
        let mut headers = HeaderMap::new();
        assert!(!has_sentinel(&headers, "warehouse-api-gateway"));

        headers.insert(HEADER_INTERNAL_REQUEST, HeaderValue::from_static("true"));
        assert!(!has_sentinel(&headers, "warehouse-api-gateway"));

        headers.insert(HEADER_GATEWAY, HeaderValue::from_static("some-other-gateway"));
        assert!(!has_sentinel(&headers, "warehouse-api-gateway"));

        headers.insert(HEADER_GATEWAY, HeaderValue::from_static("warehouse-api-gateway"));
        assert!(has_sentinel(&headers, "warehouse-api-gateway"));

        headers.insert(HEADER_INTERNAL_REQUEST, HeaderValue::from_static("false"));
        assert!(!has_sentinel(&headers, "warehouse-api-gateway"));
    }

    #[test]
    fn headers_round_trip_identity() {
        let identity = RequestIdentity {
            user_id: 17,
            email: "keeper@example.com".into(),
            roles: "Keeper".into(),
        };
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_USER_ID, HeaderValue::from_static("999"));
        identity.write_headers(&mut headers);

        assert_eq!(headers.get(HEADER_USER_ID).unwrap(), "17");
        assert_eq!(RequestIdentity::from_headers(&headers), Some(identity));
    }

    #[tokio::test]
    async fn extractor_prefers_extensions() {
        let (mut parts, _) = Request::builder()
            .header(HEADER_USER_ID, "3")
            .extension(RequestIdentity::system())
            .body(())
            .unwrap()
            .into_parts();

        let identity = RequestIdentity::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(identity.is_system());
    }

    #[tokio::test]
    async fn extractor_rejects_anonymous_requests() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let result = RequestIdentity::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }
}
