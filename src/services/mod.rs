pub mod auth_service;
pub mod chat_repository;
pub mod presence;
pub mod realtime;
pub mod socket;
pub mod token;

pub use auth_service::{AuthService, AuthSession, LoginRequest, RegisterRequest};
pub use chat_repository::{ChatRepository, CreateRoomRequest, PostMessage};
pub use presence::{Connection, ConnectionRef, PresenceRecord, PresenceTable};
pub use realtime::{ChatHub, PresenceStats};
pub use token::TokenService;
