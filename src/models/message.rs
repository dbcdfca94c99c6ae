use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::UserSummary;

pub const MAX_CONTENT_LEN: usize = 500;

/// Message routing kind. Only whispers carry a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Public,
    Whisper { target: String },
    System,
    EmojiReaction,
}

impl MessageKind {
    /// Builds the kind from the wire pair `messageType` / `whisperTarget`.
    /// A missing type means public; a target on a non-whisper is ignored.
    pub fn from_wire(message_type: Option<&str>, whisper_target: Option<String>) -> Result<Self, String> {
        match message_type.unwrap_or("public") {
            "public" => Ok(MessageKind::Public),
            "system" => Ok(MessageKind::System),
            "emoji-reaction" => Ok(MessageKind::EmojiReaction),
            "whisper" => match whisper_target.filter(|t| !t.trim().is_empty()) {
                Some(target) => Ok(MessageKind::Whisper { target }),
                None => Err("Whisper target is required".to_string()),
            },
            other => Err(format!("Unknown message type: {}", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Public => "public",
            MessageKind::Whisper { .. } => "whisper",
            MessageKind::System => "system",
            MessageKind::EmojiReaction => "emoji-reaction",
        }
    }

    pub fn whisper_target(&self) -> Option<&str> {
        match self {
            MessageKind::Whisper { target } => Some(target),
            _ => None,
        }
    }
}

/// One emoji and the users who applied it, in application order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<String>,
}

/// Stored chat message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub reactions: Vec<Reaction>,
    pub has_neon_effect: bool,
    pub neon_color: Option<String>,
    pub is_deleted: bool,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    pub has_neon_effect: bool,
    pub neon_color: Option<String>,
}

impl Message {
    pub fn new(id: String, new_message: NewMessage) -> Self {
        let now = Utc::now();
        Self {
            id,
            room_id: new_message.room_id,
            sender_id: new_message.sender_id,
            content: new_message.content,
            kind: new_message.kind,
            reactions: Vec::new(),
            has_neon_effect: new_message.has_neon_effect,
            neon_color: new_message.neon_color,
            is_deleted: false,
            is_edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `emoji` for `user_id`, or removes it if already applied.
    /// Returns true when the reaction was added.
    pub fn toggle_reaction(&mut self, user_id: &str, emoji: &str) -> bool {
        self.updated_at = Utc::now();
        let Some(index) = self.reactions.iter().position(|r| r.emoji == emoji) else {
            self.reactions.push(Reaction {
                emoji: emoji.to_string(),
                users: vec![user_id.to_string()],
            });
            return true;
        };

        let reaction = &mut self.reactions[index];
        match reaction.users.iter().position(|u| u == user_id) {
            Some(user_index) => {
                reaction.users.remove(user_index);
                if reaction.users.is_empty() {
                    self.reactions.remove(index);
                }
                false
            }
            None => {
                reaction.users.push(user_id.to_string());
                true
            }
        }
    }

    pub fn total_reactions(&self) -> usize {
        self.reactions.iter().map(|r| r.users.len()).sum()
    }

    pub fn reaction_counts(&self) -> BTreeMap<String, usize> {
        self.reactions
            .iter()
            .map(|r| (r.emoji.clone(), r.users.len()))
            .collect()
    }

    /// Whether `user_id` may see this message in history
    pub fn visible_to(&self, user_id: &str) -> bool {
        match &self.kind {
            MessageKind::Whisper { target } => self.sender_id == user_id || target == user_id,
            _ => true,
        }
    }

    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.updated_at = Utc::now();
    }

    pub fn to_view(&self, sender: UserSummary, whisper_target: Option<UserSummary>) -> MessageView {
        MessageView {
            id: self.id.clone(),
            content: self.content.clone(),
            sender,
            chatroom: self.room_id.clone(),
            message_type: self.kind.as_str().to_string(),
            whisper_target,
            reactions: self.reactions.clone(),
            total_reactions: self.total_reactions(),
            has_neon_effect: self.has_neon_effect,
            neon_color: self.neon_color.clone(),
            is_edited: self.is_edited,
            edited_at: self.edited_at,
            created_at: self.created_at,
        }
    }

    pub fn reaction_summary(&self) -> ReactionSummary {
        ReactionSummary {
            message_id: self.id.clone(),
            room_id: self.room_id.clone(),
            reactions: self.reaction_counts(),
            total_reactions: self.total_reactions(),
        }
    }
}

/// Message as delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    pub id: String,
    pub content: String,
    pub sender: UserSummary,
    pub chatroom: String,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whisper_target: Option<UserSummary>,
    pub reactions: Vec<Reaction>,
    pub total_reactions: usize,
    pub has_neon_effect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neon_color: Option<String>,
    pub is_edited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Emoji counts broadcast after a reaction toggle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub message_id: String,
    pub room_id: String,
    pub reactions: BTreeMap<String, usize>,
    pub total_reactions: usize,
}
