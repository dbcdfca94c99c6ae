// Library entry point for the server binary and integration tests
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod utils;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::ServerConfig;
use crate::middleware::RateLimitMiddleware;
use crate::middleware::rate_limit::general_rate_limiter;
use crate::routes::{api_info, auth, chat, health};
use crate::services::{AuthService, ChatHub, ChatRepository, TokenService};
use crate::store::Store;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub chat: Arc<ChatRepository>,
    pub hub: Arc<ChatHub>,
    pub config: Arc<ServerConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_days);
        let auth = Arc::new(AuthService::new(store.clone(), tokens, config.bcrypt_cost));
        let chat = Arc::new(ChatRepository::new(store));
        let hub = Arc::new(ChatHub::new(auth.clone(), chat.clone()));

        Self {
            auth,
            chat,
            hub,
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
        }
    }
}

/// REST surface without the transport-level layers added in `main`
pub fn api_router(state: AppState) -> Router {
    let limits = &state.config.rate_limit;
    let general = RateLimitMiddleware::new(general_rate_limiter(limits), limits.general_max);

    Router::new()
        .route("/", get(api_info::api_info))
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth::router(limits))
        .nest("/api/chat", chat::router())
        .layer(general)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
