use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::room::{DEFAULT_MAX_USERS, MAX_MAX_USERS, MIN_MAX_USERS};
use crate::models::{
    Chatroom, Message, MessageKind, MessageView, NeonTheme, NewChatroom, NewMessage, Topic, UserStatus,
    UserSummary,
};
use crate::store::{Store, StoreError};
use crate::utils::{
    generate_message_id, generate_room_id, validate_description, validate_message_content, validate_room_name,
};

pub const ROOM_LIST_LIMIT: usize = 50;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 100;

const ROOM_NOT_FOUND: &str = "Chatroom not found";
const MESSAGE_NOT_FOUND: &str = "Message not found";
const NOT_A_MEMBER: &str = "You must join the chatroom first";
const ROOM_FULL: &str = "room full";

/// Room creation body as received over the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub topic: Option<String>,
    pub neon_theme: Option<NeonTheme>,
    pub is_private: Option<bool>,
    pub max_users: Option<usize>,
}

impl CreateRoomRequest {
    fn validate(self) -> AppResult<NewChatroom> {
        let name = self.name.as_deref().map(str::trim).unwrap_or_default();
        let topic = self.topic.as_deref().map(str::trim).unwrap_or_default();
        if name.is_empty() || topic.is_empty() {
            return Err(AppError::validation("Room name and topic are required"));
        }

        let mut errors = Vec::new();
        if let Err(msg) = validate_room_name(name) {
            errors.push(msg.to_string());
        }

        let description = self.description.as_deref().map(str::trim).unwrap_or_default().to_string();
        if let Err(msg) = validate_description(&description) {
            errors.push(msg.to_string());
        }

        let topic = topic.parse::<Topic>().map_err(|msg| errors.push(msg)).ok();

        let max_users = self.max_users.unwrap_or(DEFAULT_MAX_USERS);
        if !(MIN_MAX_USERS..=MAX_MAX_USERS).contains(&max_users) {
            errors.push(format!(
                "Max users must be between {} and {}",
                MIN_MAX_USERS, MAX_MAX_USERS
            ));
        }

        match topic {
            Some(topic) if errors.is_empty() => Ok(NewChatroom {
                name: name.to_string(),
                description,
                topic,
                neon_theme: self.neon_theme.unwrap_or_default(),
                is_private: self.is_private.unwrap_or(false),
                max_users,
            }),
            _ => Err(AppError::invalid_fields(errors)),
        }
    }
}

/// Unvalidated message submission shared by the REST and realtime paths
#[derive(Debug, Clone)]
pub struct PostMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub has_neon_effect: bool,
    pub neon_color: Option<String>,
}

fn placeholder_summary(user_id: &str) -> UserSummary {
    UserSummary {
        id: user_id.to_string(),
        username: "unknown".to_string(),
        profile_picture: None,
        status: UserStatus::Offline,
    }
}

/// Room and message data access on top of the document store.
///
/// Every mutation is a single-document update; the store serialises
/// concurrent updates to the same room or message.
pub struct ChatRepository {
    store: Arc<dyn Store>,
}

impl ChatRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_room(&self, creator_id: &str, request: CreateRoomRequest) -> AppResult<Chatroom> {
        let new_room = request.validate()?;

        if self.store.find_active_room_by_name(&new_room.name).await?.is_some() {
            return Err(AppError::Conflict("Room name already exists".to_string()));
        }

        let room = self
            .store
            .insert_room(Chatroom::new(generate_room_id(), creator_id.to_string(), new_room))
            .await?;

        tracing::info!("Chatroom created: {} ({}) by {}", room.name, room.id, creator_id);
        Ok(room)
    }

    pub async fn list_rooms(&self) -> AppResult<Vec<Chatroom>> {
        Ok(self.store.list_active_rooms(ROOM_LIST_LIMIT).await?)
    }

    pub async fn find_active_room(&self, room_id: &str) -> AppResult<Chatroom> {
        self.store
            .find_room(room_id)
            .await?
            .filter(|room| room.is_active)
            .ok_or_else(|| AppError::NotFound(ROOM_NOT_FOUND.to_string()))
    }

    /// Adds an occupancy record. Re-joining only refreshes last-seen, even in a full room.
    pub async fn join_room(&self, room_id: &str, user_id: &str) -> AppResult<Chatroom> {
        let room = self.find_active_room(room_id).await?;
        if !room.is_occupant(user_id) && room.is_full() {
            return Err(AppError::RoomFull);
        }

        let uid = user_id.to_string();
        let updated = self
            .store
            .update_room(
                room_id,
                Box::new(move |room| {
                    if !room.is_active {
                        return Err(StoreError::Rejected(ROOM_NOT_FOUND.to_string()));
                    }
                    if !room.is_occupant(&uid) && room.is_full() {
                        return Err(StoreError::Rejected(ROOM_FULL.to_string()));
                    }
                    room.add_occupant(&uid);
                    Ok(())
                }),
            )
            .await
            .map_err(|err| match err {
                StoreError::Rejected(reason) if reason == ROOM_FULL => AppError::RoomFull,
                StoreError::Rejected(reason) => AppError::NotFound(reason),
                other => other.into(),
            })?
            .ok_or_else(|| AppError::NotFound(ROOM_NOT_FOUND.to_string()))?;

        tracing::debug!("User {} joined room {}", user_id, room_id);
        Ok(updated)
    }

    /// Removes the occupancy record; absent records are a no-op.
    pub async fn leave_room(&self, room_id: &str, user_id: &str) -> AppResult<Chatroom> {
        let uid = user_id.to_string();
        self.store
            .update_room(
                room_id,
                Box::new(move |room| {
                    room.remove_occupant(&uid);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::NotFound(ROOM_NOT_FOUND.to_string()))
    }

    pub async fn occupant_summaries(&self, room: &Chatroom) -> AppResult<Vec<UserSummary>> {
        let mut summaries = Vec::with_capacity(room.occupants.len());
        for occupant in &room.occupants {
            if let Some(user) = self.store.find_user(&occupant.user_id).await? {
                summaries.push(user.summary());
            }
        }
        Ok(summaries)
    }

    /// Validates and appends a message, then refreshes the room counters.
    ///
    /// The counter update is a second, separate write: if it fails the
    /// message stays persisted and the failure is only logged.
    pub async fn post_message(&self, post: PostMessage) -> AppResult<Message> {
        let content = validate_message_content(&post.content).map_err(AppError::validation)?;

        let room = self.find_active_room(&post.room_id).await?;
        if !room.is_occupant(&post.sender_id) {
            return Err(AppError::Forbidden(NOT_A_MEMBER.to_string()));
        }

        match &post.kind {
            MessageKind::Whisper { target } => {
                if !room.allow_whispers {
                    return Err(AppError::Forbidden("Whispers are disabled in this chatroom".to_string()));
                }
                if self.store.find_user(target).await?.is_none() {
                    return Err(AppError::NotFound("Whisper target not found".to_string()));
                }
            }
            MessageKind::EmojiReaction if !room.allow_emojis => {
                return Err(AppError::Forbidden("Emojis are disabled in this chatroom".to_string()));
            }
            _ => {}
        }

        let message = self
            .store
            .insert_message(Message::new(
                generate_message_id(),
                NewMessage {
                    room_id: post.room_id.clone(),
                    sender_id: post.sender_id.clone(),
                    content,
                    kind: post.kind,
                    has_neon_effect: post.has_neon_effect,
                    neon_color: post.neon_color.filter(|_| post.has_neon_effect),
                },
            ))
            .await?;

        let sender_id = post.sender_id;
        let counters = self
            .store
            .update_room(
                &post.room_id,
                Box::new(move |room| {
                    room.record_message();
                    room.touch_occupant(&sender_id);
                    Ok(())
                }),
            )
            .await;
        if let Err(err) = counters {
            tracing::warn!("Failed to update counters for room {}: {}", post.room_id, err);
        }

        Ok(message)
    }

    /// Toggles `emoji` for `user_id` on a live message
    pub async fn toggle_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> AppResult<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(AppError::validation("Emoji is required"));
        }

        let message = self
            .store
            .find_message(message_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or_else(|| AppError::NotFound(MESSAGE_NOT_FOUND.to_string()))?;

        if let Some(room) = self.store.find_room(&message.room_id).await? {
            if !room.allow_emojis {
                return Err(AppError::Forbidden("Emojis are disabled in this chatroom".to_string()));
            }
        }

        let uid = user_id.to_string();
        let emoji = emoji.to_string();
        self.store
            .update_message(
                message_id,
                Box::new(move |message| {
                    if message.is_deleted {
                        return Err(StoreError::Rejected(MESSAGE_NOT_FOUND.to_string()));
                    }
                    message.toggle_reaction(&uid, &emoji);
                    Ok(())
                }),
            )
            .await
            .map_err(|err| match err {
                StoreError::Rejected(reason) => AppError::NotFound(reason),
                other => other.into(),
            })?
            .ok_or_else(|| AppError::NotFound(MESSAGE_NOT_FOUND.to_string()))
    }

    /// Messages created before `before`, oldest first, hiding whispers
    /// the caller is not part of. Only current occupants may read.
    pub async fn message_history(
        &self,
        room_id: &str,
        user_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        let room = self.find_active_room(room_id).await?;
        if !room.is_occupant(user_id) {
            return Err(AppError::Forbidden(NOT_A_MEMBER.to_string()));
        }

        let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
        let mut messages = self.store.list_messages(room_id, user_id, before, limit).await?;
        messages.reverse();
        Ok(messages)
    }

    pub async fn message_view(&self, message: &Message) -> AppResult<MessageView> {
        let mut views = self.message_views(std::slice::from_ref(message)).await?;
        views
            .pop()
            .ok_or_else(|| AppError::Internal("message view missing".to_string()))
    }

    /// Resolves sender and whisper-target summaries, looking each user up once
    pub async fn message_views(&self, messages: &[Message]) -> AppResult<Vec<MessageView>> {
        let mut users: HashMap<String, UserSummary> = HashMap::new();
        let mut views = Vec::with_capacity(messages.len());

        for message in messages {
            let ids = std::iter::once(message.sender_id.as_str()).chain(message.kind.whisper_target());
            for id in ids {
                if !users.contains_key(id) {
                    let summary = match self.store.find_user(id).await? {
                        Some(user) => user.summary(),
                        None => placeholder_summary(id),
                    };
                    users.insert(id.to_string(), summary);
                }
            }

            let sender = users
                .get(&message.sender_id)
                .cloned()
                .unwrap_or_else(|| placeholder_summary(&message.sender_id));
            let target = message
                .kind
                .whisper_target()
                .map(|id| users.get(id).cloned().unwrap_or_else(|| placeholder_summary(id)));
            views.push(message.to_view(sender, target));
        }

        Ok(views)
    }
}
