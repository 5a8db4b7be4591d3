use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::auth::has_sentinel;

/// Rejects any request that did not come through the gateway. Credentials
/// other than the sentinel header pair are not considered.
pub async fn gateway_guard(
    State(gateway_name): State<Arc<str>>,
    req: Request,
    next: Next,
) -> Response {
    if has_sentinel(req.headers(), &gateway_name) {
        return next.run(req).await;
    }

    tracing::warn!(
        method = %req.method(),
        uri = %req.uri(),
        "direct access without gateway sentinel rejected"
    );

    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": "Forbidden",
            "message": "Direct access to service is not allowed. Please use API Gateway.",
            "code": "DIRECT_ACCESS_FORBIDDEN",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::{HEADER_GATEWAY, HEADER_INTERNAL_REQUEST};
    use axum::body::Body;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/api/v1/things", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                Arc::<str>::from("warehouse-api-gateway"),
                gateway_guard,
            ))
    }

    #[tokio::test]
    async fn test_request_without_sentinel_is_forbidden_even_with_bearer() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/things")
                    .header("authorization", "Bearer a.b.c")
                    .header("x-user-id", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "DIRECT_ACCESS_FORBIDDEN");
    }

    #[tokio::test]
    async fn test_wrong_gateway_name_is_forbidden() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/things")
                    .header(HEADER_INTERNAL_REQUEST, "true")
                    .header(HEADER_GATEWAY, "rogue")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_sentinel_pair_passes() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/things")
                    .header(HEADER_INTERNAL_REQUEST, "true")
                    .header(HEADER_GATEWAY, "warehouse-api-gateway")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
