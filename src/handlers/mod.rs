//! HTTP handlers of the domain roles. Every response uses the
//! `{"message": ..., "data": ...}` envelope.

pub mod callback;
pub mod dashboard;
pub mod locations;
pub mod transactions;
pub mod transfers;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::error::AppError;

/// JSON request body whose rejections render as `BadRequest` in the
/// usual error shape instead of axum's plain-text message.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

pub fn envelope<T: Serialize>(message: &str, data: T) -> Json<Value> {
    Json(json!({ "message": message, "data": data }))
}
