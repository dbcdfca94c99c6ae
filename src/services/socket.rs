use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use socketioxide::SocketIo;
use socketioxide::extract::{Data, SocketRef};
use std::future::Future;
use std::sync::Arc;

use crate::middleware::rate_limit::{KeyedRateLimiter, RateLimitConfig, create_rate_limiter};
use crate::services::presence::Connection;
use crate::services::realtime::{
    AuthPayload, ChatHub, ReactionPayload, RoomPayload, SendMessagePayload, StatusPayload, events,
};

/// Socket.IO connection as seen by the hub
pub struct SocketConnection {
    id: String,
    socket: SocketRef,
}

impl SocketConnection {
    pub fn new(socket: SocketRef) -> Self {
        Self {
            id: socket.id.to_string(),
            socket,
        }
    }
}

impl Connection for SocketConnection {
    fn id(&self) -> &str {
        &self.id
    }

    fn emit(&self, event: &str, payload: &Value) {
        if let Err(err) = self.socket.emit(event, payload) {
            tracing::debug!("Emit {} to {} failed: {}", event, self.id, err);
        }
    }

    fn close(&self) {
        if let Err(err) = self.socket.clone().disconnect() {
            tracing::debug!("Disconnect of {} failed: {:?}", self.id, err);
        }
    }
}

/// Per-socket event limits, keyed by socket id
struct SocketRateLimits {
    authenticate: KeyedRateLimiter,
    join: KeyedRateLimiter,
    send: KeyedRateLimiter,
    other: KeyedRateLimiter,
}

impl SocketRateLimits {
    fn new() -> Self {
        let config = RateLimitConfig::default();
        Self {
            authenticate: create_rate_limiter(&config, 5),
            join: create_rate_limiter(&config, 10),
            send: create_rate_limiter(&config, 30),
            other: create_rate_limiter(&config, 120),
        }
    }

    fn limiter_for(&self, event: &str) -> &KeyedRateLimiter {
        match event {
            events::AUTHENTICATE => &self.authenticate,
            events::JOIN_ROOM => &self.join,
            events::SEND_MESSAGE => &self.send,
            _ => &self.other,
        }
    }

    fn check(&self, event: &str, socket_id: &str) -> bool {
        self.limiter_for(event)
            .check_key(&format!("{}:{}", socket_id, event))
            .is_ok()
    }

    fn retain_recent(&self) {
        for limiter in [&self.authenticate, &self.join, &self.send, &self.other] {
            limiter.retain_recent();
        }
    }
}

#[derive(Clone)]
struct Context {
    hub: Arc<ChatHub>,
    limits: Arc<SocketRateLimits>,
}

/// Registers one client event: rate limit, decode the payload, then hand off to the hub
fn on_event<T, F, Fut>(socket: &SocketRef, event: &'static str, ctx: &Context, handler: F)
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<ChatHub>, String, T) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let ctx = ctx.clone();
    socket.on(event, move |socket: SocketRef, Data::<Value>(data)| {
        let ctx = ctx.clone();
        let handler = handler.clone();
        async move {
            let socket_id = socket.id.to_string();
            if !ctx.limits.check(event, &socket_id) {
                tracing::warn!("Rate limit exceeded for {}: {}", event, socket_id);
                let _ = socket.emit(events::ERROR, &json!({ "message": "Too many requests. Please wait." }));
                return;
            }

            match serde_json::from_value::<T>(data) {
                Ok(payload) => handler(ctx.hub, socket_id, payload).await,
                Err(err) => {
                    tracing::debug!("Malformed {} payload from {}: {}", event, socket_id, err);
                    let _ = socket.emit(
                        events::ERROR,
                        &json!({ "message": format!("Invalid {} payload", event) }),
                    );
                }
            }
        }
    });
}

/// Setup Socket.IO event handlers
pub fn setup_socket_handlers(io: &SocketIo, hub: Arc<ChatHub>) {
    let limits = Arc::new(SocketRateLimits::new());

    {
        let limits = limits.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limits.retain_recent();
            }
        });
    }

    let ctx = Context { hub, limits };

    io.ns("/", move |socket: SocketRef| {
        ctx.hub.connect(Arc::new(SocketConnection::new(socket.clone())));

        on_event(&socket, events::AUTHENTICATE, &ctx, |hub, id, payload: AuthPayload| async move {
            hub.authenticate(&id, payload).await
        });
        on_event(&socket, events::JOIN_ROOM, &ctx, |hub, id, payload: RoomPayload| async move {
            hub.join_room(&id, payload).await
        });
        on_event(&socket, events::LEAVE_ROOM, &ctx, |hub, id, payload: RoomPayload| async move {
            hub.leave_room(&id, payload).await
        });
        on_event(&socket, events::SEND_MESSAGE, &ctx, |hub, id, payload: SendMessagePayload| async move {
            hub.send_message(&id, payload).await
        });
        on_event(&socket, events::ADD_REACTION, &ctx, |hub, id, payload: ReactionPayload| async move {
            hub.add_reaction(&id, payload).await
        });
        on_event(&socket, events::UPDATE_STATUS, &ctx, |hub, id, payload: StatusPayload| async move {
            hub.update_status(&id, payload).await
        });
        on_event(&socket, events::TYPING_START, &ctx, |hub, id, payload: RoomPayload| async move {
            hub.typing(&id, payload, true).await
        });
        on_event(&socket, events::TYPING_STOP, &ctx, |hub, id, payload: RoomPayload| async move {
            hub.typing(&id, payload, false).await
        });

        socket.on_disconnect({
            let hub = ctx.hub.clone();
            move |socket: SocketRef| {
                let hub = hub.clone();
                async move {
                    hub.disconnect(&socket.id.to_string()).await;
                }
            }
        });
    });
}
