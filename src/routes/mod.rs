pub mod api_info;
pub mod auth;
pub mod chat;
pub mod health;

use axum::{Json, extract::rejection::JsonRejection};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Success envelope: `{ success: true, message?, ...payload }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Payload for responses that only carry a message
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

/// Unwraps a JSON body, answering malformed input in the standard error shape
pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}
