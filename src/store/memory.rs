use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Mutation, Store, StoreError, StoreResult};
use crate::models::{Chatroom, Message, User};

#[derive(Default)]
struct UserTable {
    rows: HashMap<String, User>,
    by_username: HashMap<String, String>, // username -> user_id
}

#[derive(Default)]
struct MessageTable {
    rows: Vec<Message>,
    index: HashMap<String, usize>, // message_id -> position in rows
}

/// Process-local store. Each collection sits behind its own lock, so one
/// update is atomic per document and nothing spans collections.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<UserTable>,
    rooms: RwLock<HashMap<String, Chatroom>>,
    messages: RwLock<MessageTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Applies the mutation to a copy and commits only on success.
fn apply<T: Clone>(doc: &mut T, mutation: Mutation<T>) -> StoreResult<T> {
    let mut draft = doc.clone();
    mutation(&mut draft)?;
    *doc = draft;
    Ok(doc.clone())
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut users = write(&self.users);
        if users.by_username.contains_key(&user.username) {
            return Err(StoreError::Duplicate("Username".to_string()));
        }
        users.by_username.insert(user.username.clone(), user.id.clone());
        users.rows.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(read(&self.users).rows.get(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let users = read(&self.users);
        Ok(users
            .by_username
            .get(&username.to_lowercase())
            .and_then(|id| users.rows.get(id))
            .cloned())
    }

    async fn update_user(&self, id: &str, mutation: Mutation<User>) -> StoreResult<Option<User>> {
        let mut users = write(&self.users);
        let UserTable { rows, by_username } = &mut *users;
        let Some(user) = rows.get_mut(id) else {
            return Ok(None);
        };
        let old_username = user.username.clone();
        let updated = apply(user, mutation)?;
        if updated.username != old_username {
            by_username.remove(&old_username);
            by_username.insert(updated.username.clone(), updated.id.clone());
        }
        Ok(Some(updated))
    }

    async fn insert_room(&self, room: Chatroom) -> StoreResult<Chatroom> {
        let mut rooms = write(&self.rooms);
        if rooms.contains_key(&room.id) {
            return Err(StoreError::Duplicate("Chatroom".to_string()));
        }
        rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn find_room(&self, id: &str) -> StoreResult<Option<Chatroom>> {
        Ok(read(&self.rooms).get(id).cloned())
    }

    async fn find_active_room_by_name(&self, name: &str) -> StoreResult<Option<Chatroom>> {
        let needle = name.trim().to_lowercase();
        Ok(read(&self.rooms)
            .values()
            .find(|r| r.is_active && r.name.to_lowercase() == needle)
            .cloned())
    }

    async fn list_active_rooms(&self, limit: usize) -> StoreResult<Vec<Chatroom>> {
        let mut rooms: Vec<Chatroom> = read(&self.rooms)
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        rooms.truncate(limit);
        Ok(rooms)
    }

    async fn update_room(&self, id: &str, mutation: Mutation<Chatroom>) -> StoreResult<Option<Chatroom>> {
        let mut rooms = write(&self.rooms);
        match rooms.get_mut(id) {
            Some(room) => apply(room, mutation).map(Some),
            None => Ok(None),
        }
    }

    async fn insert_message(&self, message: Message) -> StoreResult<Message> {
        let mut messages = write(&self.messages);
        if messages.index.contains_key(&message.id) {
            return Err(StoreError::Duplicate("Message".to_string()));
        }
        let position = messages.rows.len();
        messages.index.insert(message.id.clone(), position);
        messages.rows.push(message.clone());
        Ok(message)
    }

    async fn find_message(&self, id: &str) -> StoreResult<Option<Message>> {
        let messages = read(&self.messages);
        Ok(messages.index.get(id).map(|&i| messages.rows[i].clone()))
    }

    async fn list_messages(
        &self,
        room_id: &str,
        viewer_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Message>> {
        Ok(read(&self.messages)
            .rows
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id && !m.is_deleted)
            .filter(|m| before.is_none_or(|cursor| m.created_at < cursor))
            .filter(|m| m.visible_to(viewer_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_message(&self, id: &str, mutation: Mutation<Message>) -> StoreResult<Option<Message>> {
        let mut messages = write(&self.messages);
        let Some(&position) = messages.index.get(id) else {
            return Ok(None);
        };
        apply(&mut messages.rows[position], mutation).map(Some)
    }
}
