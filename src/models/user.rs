use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Presence status shown to other users
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Busy,
    Away,
    #[default]
    Offline,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Online => "online",
            UserStatus::Busy => "busy",
            UserStatus::Away => "away",
            UserStatus::Offline => "offline",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(UserStatus::Online),
            "busy" => Ok(UserStatus::Busy),
            "away" => Ok(UserStatus::Away),
            "offline" => Ok(UserStatus::Offline),
            _ => Err("Invalid status. Use: online, busy, away, or offline".to_string()),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    PreferNotToSay,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InterestedIn {
    Male,
    Female,
    NonBinary,
    Everyone,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Interest {
    Music,
    Gaming,
    Art,
    Travel,
    Movies,
    Sports,
    Food,
    Books,
    Technology,
    Fashion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    MolaPass,
    MolaGold,
    MolaBlack,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub tier: SubscriptionTier,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Registered account. Never serialized outward; use [`PublicProfile`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub status: UserStatus,
    pub bio: String,
    pub interests: Vec<Interest>,
    pub age: u8,
    pub gender: Gender,
    pub interested_in: Vec<InterestedIn>,
    pub is_active: bool,
    pub last_seen: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    pub subscription: Subscription,
}

/// Validated input for creating a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub age: u8,
    pub gender: Gender,
    pub interested_in: Vec<InterestedIn>,
    pub bio: String,
    pub interests: Vec<Interest>,
}

impl User {
    pub fn new(id: String, new_user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: new_user.username.to_lowercase(),
            password_hash: new_user.password_hash,
            profile_picture: None,
            status: UserStatus::Offline,
            bio: new_user.bio,
            interests: new_user.interests,
            age: new_user.age,
            gender: new_user.gender,
            interested_in: new_user.interested_in,
            is_active: true,
            last_seen: now,
            joined_at: now,
            subscription: Subscription::default(),
        }
    }

    pub fn set_status(&mut self, status: UserStatus) {
        self.status = status;
        self.last_seen = Utc::now();
    }

    pub fn is_premium(&self) -> bool {
        match (self.subscription.tier, self.subscription.expires_at) {
            (SubscriptionTier::Free, _) | (_, None) => false,
            (_, Some(expires_at)) => Utc::now() < expires_at,
        }
    }

    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id.clone(),
            username: self.username.clone(),
            profile_picture: self.profile_picture.clone(),
            status: self.status,
            bio: self.bio.clone(),
            interests: self.interests.clone(),
            age: self.age,
            joined_at: self.joined_at,
            last_seen: self.last_seen,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id.clone(),
            username: self.username.clone(),
            profile_picture: self.profile_picture.clone(),
            status: self.status,
        }
    }
}

/// The externally safe subset of a [`User`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub status: UserStatus,
    pub bio: String,
    pub interests: Vec<Interest>,
    pub age: u8,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Compact user reference embedded in room and message payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub profile_picture: Option<String>,
    pub status: UserStatus,
}
