pub mod message;
pub mod room;
pub mod user;

pub use message::{Message, MessageKind, MessageView, NewMessage, Reaction, ReactionSummary};
pub use room::{Chatroom, NeonTheme, NewChatroom, Occupant, RoomInfo, Topic};
pub use user::{
    Gender, Interest, InterestedIn, NewUser, PublicProfile, Subscription, SubscriptionTier, User,
    UserStatus, UserSummary,
};
