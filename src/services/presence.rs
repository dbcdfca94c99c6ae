use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{PublicProfile, UserStatus};

/// One live client connection. Emits are fire-and-forget.
pub trait Connection: Send + Sync {
    fn id(&self) -> &str;
    fn emit(&self, event: &str, payload: &Value);
    /// Force-close the underlying transport
    fn close(&self);
}

pub type ConnectionRef = Arc<dyn Connection>;

/// A connected, authenticated user
#[derive(Clone)]
pub struct PresenceRecord {
    pub user_id: String,
    pub profile: PublicProfile,
    pub connection: ConnectionRef,
    pub connected_at: DateTime<Utc>,
    pub rooms: HashSet<String>,
}

impl PresenceRecord {
    pub fn new(profile: PublicProfile, connection: ConnectionRef) -> Self {
        Self {
            user_id: profile.id.clone(),
            profile,
            connection,
            connected_at: Utc::now(),
            rooms: HashSet::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, PresenceRecord>,
    room_members: HashMap<String, HashSet<String>>, // room_id -> user ids
}

impl Inner {
    fn unindex(&mut self, record: &PresenceRecord) {
        for room_id in &record.rooms {
            if let Some(members) = self.room_members.get_mut(room_id) {
                members.remove(&record.user_id);
                if members.is_empty() {
                    self.room_members.remove(room_id);
                }
            }
        }
    }

    fn connections_in(&self, room_id: &str, skip_user: Option<&str>) -> Vec<ConnectionRef> {
        self.room_members
            .get(room_id)
            .into_iter()
            .flatten()
            .filter(|user_id| Some(user_id.as_str()) != skip_user)
            .filter_map(|user_id| self.users.get(user_id))
            .map(|record| record.connection.clone())
            .collect()
    }
}

/// Connected users and the rooms they are subscribed to.
///
/// At most one record per user. A single lock guards both the user map and
/// the room index, and every fan-out list is a snapshot taken under it.
#[derive(Default)]
pub struct PresenceTable {
    inner: RwLock<Inner>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the record, returning the one it replaced (with its rooms)
    pub fn insert(&self, record: PresenceRecord) -> Option<PresenceRecord> {
        let mut inner = self.write();
        let replaced = inner.users.insert(record.user_id.clone(), record);
        if let Some(old) = &replaced {
            inner.unindex(old);
        }
        replaced
    }

    /// Removes the user's record only if it still belongs to `connection_id`
    pub fn remove(&self, user_id: &str, connection_id: &str) -> Option<PresenceRecord> {
        let mut inner = self.write();
        if inner.users.get(user_id)?.connection.id() != connection_id {
            return None;
        }
        let record = inner.users.remove(user_id)?;
        inner.unindex(&record);
        Some(record)
    }

    pub fn is_current(&self, user_id: &str, connection_id: &str) -> bool {
        self.read()
            .users
            .get(user_id)
            .is_some_and(|r| r.connection.id() == connection_id)
    }

    /// Returns true when the room was newly added to the user's set
    pub fn join(&self, user_id: &str, room_id: &str) -> bool {
        let mut inner = self.write();
        let Some(record) = inner.users.get_mut(user_id) else {
            return false;
        };
        if !record.rooms.insert(room_id.to_string()) {
            return false;
        }
        inner
            .room_members
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        true
    }

    /// Returns true when the room was in the user's set
    pub fn leave(&self, user_id: &str, room_id: &str) -> bool {
        let mut inner = self.write();
        let removed = inner
            .users
            .get_mut(user_id)
            .is_some_and(|record| record.rooms.remove(room_id));
        if removed {
            if let Some(members) = inner.room_members.get_mut(room_id) {
                members.remove(user_id);
                if members.is_empty() {
                    inner.room_members.remove(room_id);
                }
            }
        }
        removed
    }

    pub fn is_in_room(&self, user_id: &str, room_id: &str) -> bool {
        self.read()
            .users
            .get(user_id)
            .is_some_and(|r| r.rooms.contains(room_id))
    }

    pub fn rooms_of(&self, user_id: &str) -> Vec<String> {
        self.read()
            .users
            .get(user_id)
            .map(|r| r.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every connection subscribed to the room
    pub fn subscribers(&self, room_id: &str) -> Vec<ConnectionRef> {
        self.read().connections_in(room_id, None)
    }

    pub fn subscribers_except(&self, room_id: &str, user_id: &str) -> Vec<ConnectionRef> {
        self.read().connections_in(room_id, Some(user_id))
    }

    /// Other users' connections sharing any room with `user_id`, each once
    pub fn room_peers(&self, user_id: &str) -> Vec<ConnectionRef> {
        let inner = self.read();
        let Some(record) = inner.users.get(user_id) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        record
            .rooms
            .iter()
            .flat_map(|room_id| inner.connections_in(room_id, Some(user_id)))
            .filter(|conn| seen.insert(conn.id().to_string()))
            .collect()
    }

    pub fn connection_of(&self, user_id: &str) -> Option<ConnectionRef> {
        self.read().users.get(user_id).map(|r| r.connection.clone())
    }

    pub fn profile_of(&self, user_id: &str) -> Option<PublicProfile> {
        self.read().users.get(user_id).map(|r| r.profile.clone())
    }

    pub fn set_status(&self, user_id: &str, status: UserStatus) {
        if let Some(record) = self.write().users.get_mut(user_id) {
            record.profile.status = status;
            record.profile.last_seen = Utc::now();
        }
    }

    pub fn len(&self) -> usize {
        self.read().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().users.is_empty()
    }

    /// Rooms with at least one connected subscriber
    pub fn active_room_count(&self) -> usize {
        self.read().room_members.len()
    }
}
