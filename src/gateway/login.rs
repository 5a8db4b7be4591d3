use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::GatewayState;
use crate::auth::identity::{HEADER_GATEWAY, HEADER_INTERNAL_REQUEST};
use crate::clients::Envelope;
use crate::error::AppError;
use crate::handlers::JsonBody;

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// What the User service answers to a successful credential check.
#[derive(Debug, Deserialize)]
struct VerifiedUser {
    user_id: i64,
    email: String,
    #[serde(default)]
    role: Vec<String>,
}

/// Checks credentials with the User service and issues the end-user token.
pub async fn login(
    State(state): State<GatewayState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".to_string()));
    }

    let url = format!("{}/api/v1/auth/login", state.user_service_url);
    let response = state
        .http
        .post(&url)
        .header(HEADER_INTERNAL_REQUEST, "true")
        .header(HEADER_GATEWAY, state.gateway_name.as_ref())
        .json(&request)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "user service unreachable during login");
            AppError::UpstreamUnavailable(e.to_string())
        })?;

    if !response.status().is_success() {
        tracing::info!(status = response.status().as_u16(), "login rejected by user service");
        return Err(AppError::Unauthorized("Invalid email or password".to_string()));
    }

    let user = response
        .json::<Envelope<VerifiedUser>>()
        .await
        .map_err(|e| AppError::UpstreamUnavailable(format!("invalid login response: {}", e)))?
        .data;

    let roles = user.role.join(",");
    let token = state
        .signer
        .issue_for_user(user.user_id, &user.email, &roles)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(user_id = user.user_id, "user logged in");

    Ok(Json(json!({
        "message": "Login successful",
        "data": {
            "token": token,
            "user": {
                "id": user.user_id,
                "email": user.email,
                "roles": roles,
            }
        }
    })))
}
