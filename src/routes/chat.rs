use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, Empty, json_body};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{MessageKind, MessageView, RoomInfo};
use crate::services::chat_repository::DEFAULT_HISTORY_LIMIT;
use crate::services::{CreateRoomRequest, PostMessage};

// ============= Request/Response Types =============

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub before: Option<String>,
}

impl HistoryQuery {
    fn limit(&self) -> AppResult<usize> {
        match self.limit.as_deref() {
            None | Some("") => Ok(DEFAULT_HISTORY_LIMIT),
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::validation("limit must be a positive number")),
        }
    }

    fn before(&self) -> AppResult<Option<DateTime<Utc>>> {
        self.before
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|ts| ts.with_timezone(&Utc))
                    .map_err(|_| AppError::validation("before must be an RFC 3339 timestamp"))
            })
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub message_type: Option<String>,
    pub whisper_target: Option<String>,
    #[serde(default)]
    pub has_neon_effect: bool,
    pub neon_color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomsPayload {
    pub chatrooms: Vec<RoomInfo>,
}

#[derive(Debug, Serialize)]
pub struct RoomPayload {
    pub chatroom: RoomInfo,
}

#[derive(Debug, Serialize)]
pub struct MessagesPayload {
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Serialize)]
pub struct MessagePayload {
    pub message: MessageView,
}

// ============= Router =============

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}/join", post(join_room))
        .route("/rooms/{room_id}/leave", post(leave_room))
        .route("/rooms/{room_id}/messages", get(get_messages).post(send_message))
        .route("/messages/{message_id}/react", post(add_reaction))
}

// ============= Handlers =============

async fn list_rooms(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> AppResult<Json<ApiResponse<RoomsPayload>>> {
    let rooms = state.chat.list_rooms().await?;
    Ok(Json(ApiResponse::ok(RoomsPayload {
        chatrooms: rooms.iter().map(|room| room.to_info()).collect(),
    })))
}

async fn create_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<RoomPayload>>)> {
    let room = state.chat.create_room(&user.id, json_body(payload)?).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            format!("Chatroom \"{}\" created successfully", room.name),
            RoomPayload {
                chatroom: room.to_info(),
            },
        )),
    ))
}

async fn join_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> AppResult<Json<ApiResponse<RoomPayload>>> {
    let room = state.chat.join_room(&room_id, &user.id).await?;
    Ok(Json(ApiResponse::with_message(
        format!("Welcome to {}!", room.name),
        RoomPayload {
            chatroom: room.to_info(),
        },
    )))
}

async fn leave_room(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let room = state.chat.leave_room(&room_id, &user.id).await?;
    state.hub.release_room(&user.id, &user.username, &room.id);
    Ok(Json(ApiResponse::with_message(
        format!("Left {} successfully", room.name),
        Empty {},
    )))
}

async fn get_messages(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<ApiResponse<MessagesPayload>>> {
    let messages = state
        .chat
        .message_history(&room_id, &user.id, query.before()?, query.limit()?)
        .await?;
    let messages = state.chat.message_views(&messages).await?;
    Ok(Json(ApiResponse::ok(MessagesPayload { messages })))
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(room_id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<MessagePayload>>)> {
    let request = json_body(payload)?;
    let kind = MessageKind::from_wire(request.message_type.as_deref(), request.whisper_target)
        .map_err(AppError::validation)?;

    let message = state
        .chat
        .post_message(PostMessage {
            room_id,
            sender_id: user.id,
            content: request.content.unwrap_or_default(),
            kind,
            has_neon_effect: request.has_neon_effect,
            neon_color: request.neon_color,
        })
        .await?;
    let view = state.chat.message_view(&message).await?;
    state.hub.route_message(&message, &view, None);

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(MessagePayload { message: view }))))
}

async fn add_reaction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(message_id): Path<String>,
    payload: Result<Json<ReactionRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<MessagePayload>>> {
    let emoji = json_body(payload)?.emoji.unwrap_or_default();
    let message = state.chat.toggle_reaction(&message_id, &user.id, &emoji).await?;
    state.hub.broadcast_reaction(&message, None);

    let view = state.chat.message_view(&message).await?;
    Ok(Json(ApiResponse::ok(MessagePayload { message: view })))
}
