//! Document store boundary.
//!
//! Every `update_*` call is a single atomic read-modify-write on one document.
//! There are no cross-document transactions.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Chatroom, Message, User};

pub use memory::MemoryStore;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// A mutation refused to apply; the document is left untouched.
    #[error("update rejected: {0}")]
    Rejected(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// In-place mutation applied under the document's write lock
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> StoreResult<()> + Send>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] if the username is taken.
    async fn insert_user(&self, user: User) -> StoreResult<User>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn update_user(&self, id: &str, mutation: Mutation<User>) -> StoreResult<Option<User>>;

    async fn insert_room(&self, room: Chatroom) -> StoreResult<Chatroom>;
    async fn find_room(&self, id: &str) -> StoreResult<Option<Chatroom>>;
    /// Case-insensitive lookup among active rooms
    async fn find_active_room_by_name(&self, name: &str) -> StoreResult<Option<Chatroom>>;
    /// Active rooms, most recently active first
    async fn list_active_rooms(&self, limit: usize) -> StoreResult<Vec<Chatroom>>;
    async fn update_room(&self, id: &str, mutation: Mutation<Chatroom>) -> StoreResult<Option<Chatroom>>;

    async fn insert_message(&self, message: Message) -> StoreResult<Message>;
    async fn find_message(&self, id: &str) -> StoreResult<Option<Message>>;
    /// Non-deleted messages of a room created strictly before `before` that
    /// `viewer_id` may see, newest first. `limit` counts visible messages only.
    async fn list_messages(
        &self,
        room_id: &str,
        viewer_id: &str,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> StoreResult<Vec<Message>>;
    async fn update_message(&self, id: &str, mutation: Mutation<Message>) -> StoreResult<Option<Message>>;
}
