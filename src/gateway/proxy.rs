//! Forwards authenticated requests to the owning domain service.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::GatewayState;
use crate::auth::identity::{
    HEADER_GATEWAY, HEADER_INTERNAL_REQUEST, HEADER_USER_EMAIL, HEADER_USER_ID, HEADER_USER_ROLES,
};
use crate::auth::RequestIdentity;
use crate::config::ServiceUrls;
use crate::error::AppError;

const MAX_PROXY_BODY: usize = 10 * 1024 * 1024;

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

/// Path prefixes and the service each one belongs to.
#[derive(Debug, Clone)]
pub struct ForwardingTable {
    routes: Vec<(String, String)>,
}

impl ForwardingTable {
    pub fn new(services: &ServiceUrls) -> Self {
        let owners: [(&[&str], &str); 6] = [
            (&["auth", "users", "roles", "assign-role"], &services.user),
            (&["products", "categories"], &services.product),
            (&["merchants", "merchant-products"], &services.merchant),
            (&["warehouses", "warehouse-products"], &services.warehouse),
            (&["transactions", "dashboard", "midtrans"], &services.transaction),
            (&["notifications"], &services.notification),
        ];

        let mut routes: Vec<(String, String)> = owners
            .iter()
            .flat_map(|(prefixes, url)| {
                prefixes.iter().map(move |p| {
                    (
                        format!("/api/v1/{}", p),
                        url.trim_end_matches('/').to_string(),
                    )
                })
            })
            .collect();
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self { routes }
    }

    /// Base URL of the service owning `path`, longest prefix first. A prefix
    /// only matches on a segment boundary.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(prefix, _)| {
                path.strip_prefix(prefix.as_str())
                    .map(|rest| rest.is_empty() || rest.starts_with('/'))
                    .unwrap_or(false)
            })
            .map(|(_, url)| url.as_str())
    }
}

fn is_forwardable(name: &HeaderName) -> bool {
    let name = name.as_str();
    !HOP_BY_HOP.contains(&name)
        && name != "content-length"
        && name != HEADER_INTERNAL_REQUEST
        && name != HEADER_GATEWAY
        && name != HEADER_USER_ID
        && name != HEADER_USER_EMAIL
        && name != HEADER_USER_ROLES
}

/// Headers sent upstream: the client's own (minus hop-by-hop and any identity
/// it tried to assert), then the sentinel pair and the gateway's identity.
pub fn upstream_headers(
    incoming: &HeaderMap,
    identity: Option<&RequestIdentity>,
    gateway_name: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in incoming.iter().filter(|(name, _)| is_forwardable(name)) {
        headers.append(name.clone(), value.clone());
    }

    headers.insert(HEADER_INTERNAL_REQUEST, HeaderValue::from_static("true"));
    if let Ok(value) = HeaderValue::from_str(gateway_name) {
        headers.insert(HEADER_GATEWAY, value);
    }
    if let Some(identity) = identity {
        identity.write_headers(&mut headers);
    }
    headers
}

pub async fn proxy(State(state): State<GatewayState>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let Some(base_url) = state.routes.resolve(&path).map(str::to_string) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Not Found", "message": "Service not found", "path": path })),
        )
            .into_response();
    };

    match forward(&state, &base_url, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward(state: &GatewayState, base_url: &str, req: Request) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", base_url, path_and_query);

    let body = axum::body::to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|_| AppError::BadRequest("Request body too large".to_string()))?;

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| AppError::BadRequest("Unsupported method".to_string()))?;
    let identity = parts.extensions.get::<RequestIdentity>();

    let mut builder = state.http.request(method, &url);
    for (name, value) in upstream_headers(&parts.headers, identity, &state.gateway_name).iter() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let upstream = builder.body(body).send().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "upstream request failed");
        AppError::UpstreamUnavailable(format!("{}: {}", base_url, e))
    })?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) else {
            continue;
        };
        if !HOP_BY_HOP.contains(&name.as_str()) && name.as_str() != "content-length" {
            headers.append(name, value);
        }
    }

    let bytes: Bytes = upstream.bytes().await.map_err(|e| {
        tracing::error!(url = %url, error = %e, "failed to read upstream response");
        AppError::UpstreamUnavailable(format!("{}: {}", base_url, e))
    })?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
