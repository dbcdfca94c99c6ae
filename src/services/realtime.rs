use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use super::auth_service::AuthService;
use super::chat_repository::{ChatRepository, PostMessage};
use super::presence::{ConnectionRef, PresenceRecord, PresenceTable};
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageKind, MessageView, User, UserStatus};

/// Event names exchanged with clients
pub mod events {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const ADD_REACTION: &str = "add_reaction";
    pub const UPDATE_STATUS: &str = "update_status";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";

    pub const AUTHENTICATED: &str = "authenticated";
    pub const AUTH_ERROR: &str = "auth_error";
    pub const ROOM_JOINED: &str = "room_joined";
    pub const ROOM_LEFT: &str = "room_left";
    pub const USER_JOINED: &str = "user_joined";
    pub const USER_LEFT: &str = "user_left";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const MESSAGE_SENT: &str = "message_sent";
    pub const REACTION_UPDATED: &str = "reaction_updated";
    pub const USER_STATUS_UPDATED: &str = "user_status_updated";
    pub const STATUS_UPDATED: &str = "status_updated";
    pub const USER_TYPING: &str = "user_typing";
    pub const ERROR: &str = "error";
}

/// `authenticate` accepts a bare token or `{ "token": ... }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AuthPayload {
    Token(String),
    Object { token: Option<String> },
}

impl AuthPayload {
    fn token(self) -> Option<String> {
        match self {
            AuthPayload::Token(token) => Some(token),
            AuthPayload::Object { token } => token,
        }
        .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_id: String,
    #[serde(default)]
    pub content: String,
    pub message_type: Option<String>,
    pub whisper_target: Option<String>,
    #[serde(default)]
    pub has_neon_effect: bool,
    pub neon_color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionPayload {
    pub message_id: String,
    #[serde(default)]
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
    #[serde(default)]
    pub status: String,
}

/// User reference carried by join/leave notices
#[derive(Debug, Clone, Serialize)]
struct UserRef<'a> {
    id: &'a str,
    username: &'a str,
}

#[derive(Debug, Clone)]
struct SessionUser {
    user_id: String,
    username: String,
}

#[derive(Debug, Clone)]
enum SessionState {
    Unauthenticated,
    Authenticated(SessionUser),
    Disconnected,
}

struct Session {
    connection: ConnectionRef,
    /// Held for the whole of each handler, so one connection's events run one at a time
    state: Mutex<SessionState>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStats {
    pub open_connections: usize,
    pub connected_users: usize,
    pub active_rooms: usize,
}

fn emit_all(connections: &[ConnectionRef], event: &str, payload: &Value) {
    for connection in connections {
        connection.emit(event, payload);
    }
}

/// Adds `extra` to `connections` unless a connection with its id is already there
fn with_connection(mut connections: Vec<ConnectionRef>, extra: Option<ConnectionRef>) -> Vec<ConnectionRef> {
    if let Some(extra) = extra {
        if !connections.iter().any(|c| c.id() == extra.id()) {
            connections.push(extra);
        }
    }
    connections
}

/// Realtime presence and messaging core.
///
/// Owns the presence table and one session per transport connection.
/// Every handler validates the session state first; failures are sent back
/// to the originating connection as an `error` event and never close it.
pub struct ChatHub {
    auth: Arc<AuthService>,
    repo: Arc<ChatRepository>,
    presence: PresenceTable,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl ChatHub {
    pub fn new(auth: Arc<AuthService>, repo: Arc<ChatRepository>) -> Self {
        Self {
            auth,
            repo,
            presence: PresenceTable::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn presence(&self) -> &PresenceTable {
        &self.presence
    }

    pub fn stats(&self) -> PresenceStats {
        PresenceStats {
            open_connections: self.sessions.read().unwrap_or_else(PoisonError::into_inner).len(),
            connected_users: self.presence.len(),
            active_rooms: self.presence.active_room_count(),
        }
    }

    fn session(&self, connection_id: &str) -> Option<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(connection_id)
            .cloned();
        if session.is_none() {
            tracing::debug!("Event from unknown connection {}", connection_id);
        }
        session
    }

    /// Resolves the caller, rejecting sessions that were replaced by a newer login
    fn current_user<'a>(&self, connection_id: &str, state: &'a SessionState) -> AppResult<&'a SessionUser> {
        match state {
            SessionState::Authenticated(user) if self.presence.is_current(&user.user_id, connection_id) => Ok(user),
            SessionState::Authenticated(_) => Err(AppError::Auth(
                "Session was replaced by a newer connection".to_string(),
            )),
            _ => Err(AppError::Auth("Not authenticated".to_string())),
        }
    }

    fn report(&self, connection: &ConnectionRef, event: &str, result: AppResult<()>) {
        if let Err(err) = result {
            match &err {
                AppError::Internal(detail) => tracing::error!("{} failed: {}", event, detail),
                other => tracing::debug!("{} rejected for {}: {}", event, connection.id(), other),
            }
            connection.emit(events::ERROR, &json!({ "message": err.public_message() }));
        }
    }

    /// Registers a fresh, unauthenticated connection
    pub fn connect(&self, connection: ConnectionRef) {
        tracing::info!("New connection: {}", connection.id());
        let session = Arc::new(Session {
            connection: connection.clone(),
            state: Mutex::new(SessionState::Unauthenticated),
        });
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.id().to_string(), session);
    }

    pub async fn authenticate(&self, connection_id: &str, payload: AuthPayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let mut state = session.state.lock().await;

        if !matches!(*state, SessionState::Unauthenticated) {
            self.report(
                &session.connection,
                events::AUTHENTICATE,
                Err(AppError::validation("Already authenticated")),
            );
            return;
        }

        let Some(token) = payload.token() else {
            session
                .connection
                .emit(events::AUTH_ERROR, &json!({ "message": "No token provided" }));
            return;
        };

        let user = match self.sign_in(&token).await {
            Ok(user) => user,
            Err(err) => {
                tracing::debug!("Socket authentication failed for {}: {}", connection_id, err);
                session
                    .connection
                    .emit(events::AUTH_ERROR, &json!({ "message": err.public_message() }));
                return;
            }
        };

        let profile = user.public_profile();
        let replaced = self
            .presence
            .insert(PresenceRecord::new(profile.clone(), session.connection.clone()));
        *state = SessionState::Authenticated(SessionUser {
            user_id: user.id.clone(),
            username: user.username.clone(),
        });

        if let Some(old) = replaced.filter(|old| old.connection.id() != connection_id) {
            self.evict(old, &user.username).await;
        }

        session.connection.emit(
            events::AUTHENTICATED,
            &json!({ "success": true, "user": profile }),
        );
        tracing::info!("User authenticated: {} ({})", user.username, connection_id);
    }

    async fn sign_in(&self, token: &str) -> AppResult<User> {
        let user = self.auth.authenticate(token).await?;
        self.auth.set_status(&user.id, UserStatus::Online).await
    }

    /// Releases the rooms of a session that lost its presence record to a newer login
    async fn evict(&self, old: PresenceRecord, username: &str) {
        tracing::info!(
            "Replacing connection {} for user {}",
            old.connection.id(),
            old.user_id
        );

        let notice = json!({
            "user": UserRef { id: &old.user_id, username },
            "message": format!("{} signed in elsewhere", username),
        });
        for room_id in &old.rooms {
            if let Err(err) = self.repo.leave_room(room_id, &old.user_id).await {
                tracing::warn!("Failed to release room {} for {}: {}", room_id, old.user_id, err);
            }
            let mut payload = notice.clone();
            payload["roomId"] = json!(room_id);
            emit_all(
                &self.presence.subscribers_except(room_id, &old.user_id),
                events::USER_LEFT,
                &payload,
            );
        }

        old.connection.emit(
            events::ERROR,
            &json!({ "message": "Signed in from another connection" }),
        );
        old.connection.close();
    }

    pub async fn join_room(&self, connection_id: &str, payload: RoomPayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = match self.current_user(connection_id, &state) {
            Ok(user) => self.join_room_as(&session.connection, user, &payload.room_id).await,
            Err(err) => Err(err),
        };
        self.report(&session.connection, events::JOIN_ROOM, result);
    }

    async fn join_room_as(&self, connection: &ConnectionRef, user: &SessionUser, room_id: &str) -> AppResult<()> {
        let room = self.repo.join_room(room_id, &user.user_id).await?;
        let active_users = self.repo.occupant_summaries(&room).await.unwrap_or_else(|err| {
            tracing::warn!("Failed to load occupants of room {}: {}", room_id, err);
            Vec::new()
        });
        let newly_subscribed = self.presence.join(&user.user_id, room_id);

        if newly_subscribed {
            emit_all(
                &self.presence.subscribers_except(room_id, &user.user_id),
                events::USER_JOINED,
                &json!({
                    "user": UserRef { id: &user.user_id, username: &user.username },
                    "roomId": room_id,
                    "message": format!("{} joined the room!", user.username),
                }),
            );
        }

        connection.emit(
            events::ROOM_JOINED,
            &json!({ "room": room.to_info(), "activeUsers": active_users }),
        );
        tracing::info!("{} joined room {}", user.username, room.name);
        Ok(())
    }

    pub async fn leave_room(&self, connection_id: &str, payload: RoomPayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = match self.current_user(connection_id, &state) {
            Ok(user) => self.leave_room_as(&session.connection, user, &payload.room_id).await,
            Err(err) => Err(err),
        };
        self.report(&session.connection, events::LEAVE_ROOM, result);
    }

    async fn leave_room_as(&self, connection: &ConnectionRef, user: &SessionUser, room_id: &str) -> AppResult<()> {
        let room = self.repo.leave_room(room_id, &user.user_id).await?;
        self.unsubscribe(&user.user_id, &user.username, room_id);
        connection.emit(events::ROOM_LEFT, &json!({ "roomId": room_id }));
        tracing::info!("{} left room {}", user.username, room.name);
        Ok(())
    }

    /// Mirrors a leave made outside the realtime channel: the user's live
    /// connection stops receiving the room and the remaining members are told.
    pub fn release_room(&self, user_id: &str, username: &str, room_id: &str) {
        if self.unsubscribe(user_id, username, room_id) {
            if let Some(connection) = self.presence.connection_of(user_id) {
                connection.emit(events::ROOM_LEFT, &json!({ "roomId": room_id }));
            }
        }
        tracing::info!("{} released room {}", username, room_id);
    }

    /// Drops the room subscription and sends `user_left` to whoever remains.
    /// Returns whether the user was subscribed.
    fn unsubscribe(&self, user_id: &str, username: &str, room_id: &str) -> bool {
        let was_subscribed = self.presence.leave(user_id, room_id);
        emit_all(
            &self.presence.subscribers(room_id),
            events::USER_LEFT,
            &json!({
                "user": UserRef { id: user_id, username },
                "roomId": room_id,
                "message": format!("{} left the room", username),
            }),
        );
        was_subscribed
    }

    pub async fn send_message(&self, connection_id: &str, payload: SendMessagePayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = match self.current_user(connection_id, &state) {
            Ok(user) => self.send_message_as(&session.connection, user, payload).await,
            Err(err) => Err(err),
        };
        self.report(&session.connection, events::SEND_MESSAGE, result);
    }

    async fn send_message_as(
        &self,
        connection: &ConnectionRef,
        user: &SessionUser,
        payload: SendMessagePayload,
    ) -> AppResult<()> {
        let kind = MessageKind::from_wire(payload.message_type.as_deref(), payload.whisper_target)
            .map_err(AppError::validation)?;

        let message = self
            .repo
            .post_message(PostMessage {
                room_id: payload.room_id,
                sender_id: user.user_id.clone(),
                content: payload.content,
                kind,
                has_neon_effect: payload.has_neon_effect,
                neon_color: payload.neon_color,
            })
            .await?;
        let view = self.repo.message_view(&message).await?;

        self.route_message(&message, &view, Some(connection.clone()));
        connection.emit(
            events::MESSAGE_SENT,
            &json!({ "success": true, "messageId": message.id }),
        );
        Ok(())
    }

    /// Delivers a stored message. Whispers reach only the sender and the
    /// target's live connection; everything else reaches the whole room.
    pub fn route_message(&self, message: &Message, view: &MessageView, sender: Option<ConnectionRef>) {
        let sender = sender.or_else(|| self.presence.connection_of(&message.sender_id));
        let payload = json!(view);

        let recipients = match &message.kind {
            MessageKind::Whisper { target } => {
                let recipients = sender.into_iter().collect();
                let target_connection = self.presence.connection_of(target);
                if target_connection.is_none() {
                    tracing::debug!("Whisper target {} is offline, dropping delivery", target);
                }
                with_connection(recipients, target_connection)
            }
            _ => with_connection(self.presence.subscribers(&message.room_id), sender),
        };

        emit_all(&recipients, events::NEW_MESSAGE, &payload);
        tracing::debug!(
            "Delivered {} message {} in {} to {} connection(s)",
            message.kind.as_str(),
            message.id,
            message.room_id,
            recipients.len()
        );
    }

    pub async fn add_reaction(&self, connection_id: &str, payload: ReactionPayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = match self.current_user(connection_id, &state) {
            Ok(user) => match self
                .repo
                .toggle_reaction(&payload.message_id, &user.user_id, &payload.emoji)
                .await
            {
                Ok(message) => {
                    self.broadcast_reaction(&message, Some(session.connection.clone()));
                    Ok(())
                }
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        self.report(&session.connection, events::ADD_REACTION, result);
    }

    /// Sends the updated emoji counts to the message's room
    pub fn broadcast_reaction(&self, message: &Message, actor: Option<ConnectionRef>) {
        let recipients = with_connection(self.presence.subscribers(&message.room_id), actor);
        emit_all(
            &recipients,
            events::REACTION_UPDATED,
            &json!(message.reaction_summary()),
        );
    }

    pub async fn update_status(&self, connection_id: &str, payload: StatusPayload) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = match self.current_user(connection_id, &state) {
            Ok(user) => match payload.status.parse::<UserStatus>() {
                Ok(status) => self.change_status(&user.user_id, status).await.map(|_| {
                    session
                        .connection
                        .emit(events::STATUS_UPDATED, &json!({ "status": status }));
                }),
                Err(msg) => Err(AppError::validation(msg)),
            },
            Err(err) => Err(err),
        };
        self.report(&session.connection, events::UPDATE_STATUS, result);
    }

    /// Persists a status change and tells everyone sharing a room with the user
    pub async fn change_status(&self, user_id: &str, status: UserStatus) -> AppResult<User> {
        let user = self.auth.set_status(user_id, status).await?;
        self.presence.set_status(user_id, status);

        emit_all(
            &self.presence.room_peers(user_id),
            events::USER_STATUS_UPDATED,
            &json!({ "userId": user.id, "username": user.username, "status": status }),
        );
        tracing::info!("{} status updated to {}", user.username, status);
        Ok(user)
    }

    pub async fn typing(&self, connection_id: &str, payload: RoomPayload, is_typing: bool) {
        let Some(session) = self.session(connection_id) else {
            return;
        };
        let state = session.state.lock().await;
        let result = self.current_user(connection_id, &state).and_then(|user| {
            if !self.presence.is_in_room(&user.user_id, &payload.room_id) {
                return Err(AppError::Forbidden("You must join the chatroom first".to_string()));
            }
            emit_all(
                &self.presence.subscribers_except(&payload.room_id, &user.user_id),
                events::USER_TYPING,
                &json!({
                    "userId": user.user_id,
                    "username": user.username,
                    "roomId": payload.room_id,
                    "isTyping": is_typing,
                }),
            );
            Ok(())
        });
        let event = if is_typing { events::TYPING_START } else { events::TYPING_STOP };
        self.report(&session.connection, event, result);
    }

    /// Transport closed. Cleanup is best-effort: failures are logged and
    /// the remaining steps still run.
    pub async fn disconnect(&self, connection_id: &str) {
        let Some(session) = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(connection_id)
        else {
            return;
        };

        let previous = {
            let mut state = session.state.lock().await;
            std::mem::replace(&mut *state, SessionState::Disconnected)
        };

        let SessionState::Authenticated(user) = previous else {
            tracing::info!("Anonymous connection closed: {}", connection_id);
            return;
        };

        let Some(record) = self.presence.remove(&user.user_id, connection_id) else {
            tracing::info!(
                "Replaced connection {} for {} closed",
                connection_id,
                user.username
            );
            return;
        };
        tracing::info!("User disconnected: {} ({})", user.username, connection_id);

        let mut notified = 0;
        for room_id in &record.rooms {
            if let Err(err) = self.repo.leave_room(room_id, &user.user_id).await {
                tracing::warn!("Failed to remove {} from room {}: {}", user.user_id, room_id, err);
            }
            let recipients = self.presence.subscribers(room_id);
            emit_all(
                &recipients,
                events::USER_LEFT,
                &json!({
                    "user": UserRef { id: &user.user_id, username: &user.username },
                    "roomId": room_id,
                    "message": format!("{} disconnected", user.username),
                }),
            );
            notified += recipients.len();
        }

        if let Err(err) = self.auth.set_status(&user.user_id, UserStatus::Offline).await {
            tracing::warn!("Failed to mark {} offline: {}", user.user_id, err);
        }
        tracing::debug!(
            "Disconnect of {} sent {} user_left notice(s)",
            user.username,
            notified
        );
    }
}
