//! Shared helpers for integration tests: app state builders, a recording
//! realtime connection, and small request/response utilities.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use neon_chat_server::config::ServerConfig;
use neon_chat_server::middleware::RateLimitConfig;
use neon_chat_server::services::realtime::AuthPayload;
use neon_chat_server::services::{AuthSession, Connection, RegisterRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neon_chat_server::models::{Chatroom, Message, User};
use neon_chat_server::store::{MemoryStore, Mutation, Store, StoreError, StoreResult};
use neon_chat_server::{AppState, api_router};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

// ============================================================================
// App builders
// ============================================================================

pub fn test_config() -> ServerConfig {
    ServerConfig {
        jwt_secret: "test-secret".to_string(),
        bcrypt_cost: 4,
        rate_limit: RateLimitConfig {
            window_secs: 60,
            general_max: 10_000,
            auth_max: 1_000,
        },
        ..ServerConfig::default()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<dyn Store>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn Store>) -> Self {
        let state = AppState::new(config, store.clone());
        Self { state, store }
    }

    pub fn router(&self) -> Router {
        api_router(self.state.clone())
    }

    pub async fn register(&self, username: &str) -> AuthSession {
        self.state
            .auth
            .register(register_request(username))
            .await
            .expect("registration should succeed")
    }

    /// Opens a recording connection and authenticates it with `token`
    pub async fn connect(&self, connection_id: &str, token: &str) -> Arc<RecordingConnection> {
        let connection = RecordingConnection::new(connection_id);
        self.state.hub.connect(connection.clone());
        self.state
            .hub
            .authenticate(connection_id, AuthPayload::Token(token.to_string()))
            .await;
        assert_eq!(
            connection.events_named("authenticated").len(),
            1,
            "connection {} failed to authenticate: {:?}",
            connection_id,
            connection.all()
        );
        connection.clear();
        connection
    }
}

pub fn register_request(username: &str) -> RegisterRequest {
    RegisterRequest {
        username: Some(username.to_string()),
        password: Some("secret123".to_string()),
        age: Some(25),
        gender: Some("female".to_string()),
        interested_in: Some(vec!["everyone".to_string()]),
        ..Default::default()
    }
}

// ============================================================================
// Recording connection
// ============================================================================

/// Connection that keeps every emitted event for later assertions
pub struct RecordingConnection {
    id: String,
    events: Mutex<Vec<(String, Value)>>,
    closed: AtomicBool,
}

impl RecordingConnection {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn all(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_named(&self, event: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn last(&self, event: &str) -> Option<Value> {
        self.events_named(event).pop()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn emit(&self, event: &str, payload: &Value) {
        self.events
            .lock()
            .unwrap()
            .push((event.to_string(), payload.clone()));
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Store with switchable user lookups
// ============================================================================

/// Memory store whose `find_user` can be made to fail on demand
#[derive(Default)]
pub struct UnreliableStore {
    inner: MemoryStore,
    fail_user_lookups: AtomicBool,
}

impl UnreliableStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_user_lookups(&self, fail: bool) {
        self.fail_user_lookups.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for UnreliableStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        self.inner.insert_user(user).await
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        if self.fail_user_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("user lookups disabled".to_string()));
        }
        self.inner.find_user(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_username(username).await
    }

    async fn update_user(&self, id: &str, mutation: Mutation<User>) -> StoreResult<Option<User>> {
        self.inner.update_user(id, mutation).await
    }

    async fn insert_room(&self, room: Chatroom) -> StoreResult<Chatroom> {
        self.inner.insert_room(room).await
    }

    async fn find_room(&self, id: &str) -> StoreResult<Option<Chatroom>> {
        self.inner.find_room(id).await
    }

    async fn find_active_room_by_name(&self, name: &str) -> StoreResult<Option<Chatroom>> {
        self.inner.find_active_room_by_name(name).await
    }

    async fn list_active_rooms(&self, limit: usize) -> StoreResult<Vec<Chatroom>> {
        self.inner.list_active_rooms(limit).await
    }

    async fn update_room(&self, id: &str, mutation: Mutation<Chatroom>) -> StoreResult<Option<Chatroom>> {
        self.inner.update_room(id, mutation).await
    }

    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        self.inner.insert_message(message).await
    }

    async fn find_message(&self, id: &str) -> StoreResult<Option<Message>> {
        self.inner.find_message(id).await
    }

    async fn list_messages(
        &self,
        room_id: &str,
        viewer_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        self.inner.list_messages(room_id, viewer_id, before, limit).await
    }

    async fn update_message(&self, id: &str, mutation: Mutation<Message>) -> StoreResult<Option<Message>> {
        self.inner.update_message(id, mutation).await
    }
}

// ============================================================================
// HTTP helpers
// ============================================================================

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
    builder.body(body).unwrap()
}

pub async fn send(router: Router, request: Request<Body>) -> (u16, Value) {
    let response: Response<Body> = router.oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
