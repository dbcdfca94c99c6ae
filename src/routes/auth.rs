use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, Empty, json_body};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimitMiddleware, auth_rate_limiter};
use crate::middleware::AuthUser;
use crate::models::{PublicProfile, UserStatus};
use crate::services::{AuthSession, LoginRequest, RegisterRequest};

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPayload {
    pub user: PublicProfile,
}

pub fn router(limits: &RateLimitConfig) -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route_layer(RateLimitMiddleware::new(auth_rate_limiter(limits), limits.auth_max));

    Router::new()
        .route("/me", get(me))
        .route("/status", put(update_status))
        .route("/logout", post(logout))
        .merge(credentials)
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthSession>>)> {
    let session = state.auth.register(json_body(payload)?).await?;
    let message = format!("Welcome to Neon, {}!", session.user.username);
    Ok((StatusCode::CREATED, Json(ApiResponse::with_message(message, session))))
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<AuthSession>>> {
    let session = state.auth.login(json_body(payload)?).await?;
    let message = format!("Welcome back, {}!", session.user.username);
    Ok(Json(ApiResponse::with_message(message, session)))
}

async fn me(AuthUser(user): AuthUser) -> Json<ApiResponse<UserPayload>> {
    Json(ApiResponse::ok(UserPayload {
        user: user.public_profile(),
    }))
}

async fn update_status(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<UserPayload>>> {
    let status: UserStatus = json_body(payload)?
        .status
        .unwrap_or_default()
        .parse()
        .map_err(AppError::validation)?;

    let user = state.hub.change_status(&user.id, status).await?;
    Ok(Json(ApiResponse::with_message(
        format!("Status updated to {}", status),
        UserPayload {
            user: user.public_profile(),
        },
    )))
}

async fn logout(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Json<ApiResponse<Empty>>> {
    state.hub.change_status(&user.id, UserStatus::Offline).await?;
    tracing::info!("User logged out: {}", user.username);
    Ok(Json(ApiResponse::with_message("Logged out successfully", Empty {})))
}
