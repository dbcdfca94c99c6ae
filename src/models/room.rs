use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_MAX_USERS: usize = 100;
pub const MIN_MAX_USERS: usize = 2;
pub const MAX_MAX_USERS: usize = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Music,
    Gaming,
    Movies,
    Art,
    Travel,
    Sports,
    Food,
    Books,
    Technology,
    Fashion,
    #[default]
    General,
    Vibes,
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown topic: {}", s))
    }
}

/// Visual theme for the neon room skin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NeonTheme {
    pub primary_color: String,
    pub secondary_color: String,
    pub background_gradient: String,
}

impl Default for NeonTheme {
    fn default() -> Self {
        Self {
            primary_color: "#FF00FF".to_string(),
            secondary_color: "#00FFFF".to_string(),
            background_gradient: "linear-gradient(135deg, #1a1a2e, #16213e, #0f3460)".to_string(),
        }
    }
}

/// One currently joined user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Occupant {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Chatroom document
#[derive(Debug, Clone)]
pub struct Chatroom {
    pub id: String,
    pub name: String,
    pub description: String,
    pub topic: Topic,
    pub neon_theme: NeonTheme,
    pub created_by: String,
    pub occupants: Vec<Occupant>,
    pub is_private: bool,
    pub max_users: usize,
    pub allow_whispers: bool,
    pub allow_emojis: bool,
    pub is_premium_room: bool,
    pub total_messages: u64,
    pub last_activity: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Room info for API responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub topic: Topic,
    pub neon_theme: NeonTheme,
    pub created_by: String,
    pub current_user_count: usize,
    pub max_users: usize,
    pub is_private: bool,
    pub allow_whispers: bool,
    pub allow_emojis: bool,
    pub is_premium_room: bool,
    pub total_messages: u64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Validated input for creating a room
#[derive(Debug, Clone)]
pub struct NewChatroom {
    pub name: String,
    pub description: String,
    pub topic: Topic,
    pub neon_theme: NeonTheme,
    pub is_private: bool,
    pub max_users: usize,
}

impl Chatroom {
    /// Creates an active room with its creator as the first occupant.
    pub fn new(id: String, created_by: String, new_room: NewChatroom) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: new_room.name,
            description: new_room.description,
            topic: new_room.topic,
            neon_theme: new_room.neon_theme,
            occupants: vec![Occupant {
                user_id: created_by.clone(),
                joined_at: now,
                last_seen: now,
            }],
            created_by,
            is_private: new_room.is_private,
            max_users: new_room.max_users,
            allow_whispers: true,
            allow_emojis: true,
            is_premium_room: false,
            total_messages: 0,
            last_activity: now,
            is_active: true,
            created_at: now,
        }
    }

    pub fn is_occupant(&self, user_id: &str) -> bool {
        self.occupants.iter().any(|o| o.user_id == user_id)
    }

    pub fn is_full(&self) -> bool {
        self.occupants.len() >= self.max_users
    }

    /// Adds an occupancy record, or refreshes last-seen if the user is already in.
    /// Returns true when a new record was added.
    pub fn add_occupant(&mut self, user_id: &str) -> bool {
        let now = Utc::now();
        self.last_activity = now;
        if let Some(existing) = self.occupants.iter_mut().find(|o| o.user_id == user_id) {
            existing.last_seen = now;
            return false;
        }
        self.occupants.push(Occupant {
            user_id: user_id.to_string(),
            joined_at: now,
            last_seen: now,
        });
        true
    }

    /// Returns true when a record was removed.
    pub fn remove_occupant(&mut self, user_id: &str) -> bool {
        let before = self.occupants.len();
        self.occupants.retain(|o| o.user_id != user_id);
        self.last_activity = Utc::now();
        self.occupants.len() != before
    }

    pub fn touch_occupant(&mut self, user_id: &str) {
        let now = Utc::now();
        if let Some(existing) = self.occupants.iter_mut().find(|o| o.user_id == user_id) {
            existing.last_seen = now;
            self.last_activity = now;
        }
    }

    pub fn record_message(&mut self) {
        self.total_messages += 1;
        self.last_activity = Utc::now();
    }

    pub fn to_info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            topic: self.topic,
            neon_theme: self.neon_theme.clone(),
            created_by: self.created_by.clone(),
            current_user_count: self.occupants.len(),
            max_users: self.max_users,
            is_private: self.is_private,
            allow_whispers: self.allow_whispers,
            allow_emojis: self.allow_emojis,
            is_premium_room: self.is_premium_room,
            total_messages: self.total_messages,
            last_activity: self.last_activity,
            created_at: self.created_at,
        }
    }
}
