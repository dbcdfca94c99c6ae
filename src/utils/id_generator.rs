use uuid::Uuid;

fn short_id(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..16])
}

/// Generate a unique user ID
pub fn generate_user_id() -> String {
    short_id("usr")
}

/// Generate a unique chatroom ID
pub fn generate_room_id() -> String {
    short_id("room")
}

/// Generate a unique message ID
pub fn generate_message_id() -> String {
    short_id("msg")
}
