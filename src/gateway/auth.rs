use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::GatewayState;
use crate::auth::{has_sentinel, RequestIdentity};
use crate::error::AppError;

pub const PUBLIC_PATHS: [&str; 3] = ["/health", "/api/v1/auth/login", "/api/v1/midtrans/callback"];

pub fn is_public(path: &str) -> bool {
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    PUBLIC_PATHS.contains(&path)
}

/// Establishes the caller identity for every non-public request and stores
/// it in the request extensions for the proxy.
pub async fn authenticate(State(state): State<GatewayState>, mut req: Request, next: Next) -> Response {
    if is_public(req.uri().path()) {
        return next.run(req).await;
    }

    let identity = if has_sentinel(req.headers(), &state.gateway_name) {
        RequestIdentity::system()
    } else {
        match bearer_identity(&state, &req) {
            Ok(identity) => identity,
            Err(e) => return e.into_response(),
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

fn bearer_identity(state: &GatewayState, req: &Request) -> Result<RequestIdentity, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Authorization header required".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid token format. Use 'Bearer <token>'".to_string()))?;

    let claims = state.signer.verify(token.trim()).map_err(|e| {
        tracing::debug!(error = %e, path = %req.uri().path(), "bearer token rejected");
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    Ok(RequestIdentity::from_claims(&claims))
}
