use crate::models::message::MAX_CONTENT_LEN;

pub const MAX_BIO_LEN: usize = 140;
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// Validate username format.
///
/// Rules:
/// - Length: 3-20 characters
/// - Character set: letters, numbers, underscore
pub fn validate_username(username: &str) -> Result<(), &'static str> {
    let len = username.chars().count();
    if len < 3 {
        return Err("Username must be at least 3 characters");
    }
    if len > 20 {
        return Err("Username cannot exceed 20 characters");
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Username can only contain letters, numbers, and underscores");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters");
    }
    Ok(())
}

pub fn validate_age(age: u32) -> Result<(), &'static str> {
    if age < 18 {
        return Err("Must be at least 18 years old");
    }
    if age > 100 {
        return Err("Invalid age");
    }
    Ok(())
}

pub fn validate_bio(bio: &str) -> Result<(), &'static str> {
    if bio.chars().count() > MAX_BIO_LEN {
        return Err("Bio cannot exceed 140 characters");
    }
    Ok(())
}

/// Room names are compared trimmed; 3-30 characters.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    let len = name.trim().chars().count();
    if len < 3 {
        return Err("Chatroom name must be at least 3 characters");
    }
    if len > 30 {
        return Err("Chatroom name cannot exceed 30 characters");
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), &'static str> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err("Description cannot exceed 200 characters");
    }
    Ok(())
}

/// Returns the trimmed content when it is non-empty and within bounds.
pub fn validate_message_content(content: &str) -> Result<String, &'static str> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("Message content is required");
    }
    if trimmed.chars().count() > MAX_CONTENT_LEN {
        return Err("Message cannot exceed 500 characters");
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("bob").is_ok());
        assert!(validate_username("Alice_99").is_ok());
        assert!(validate_username(&"a".repeat(20)).is_ok());
    }

    #[test]
    fn test_username_length() {
        assert_eq!(validate_username("ab").unwrap_err(), "Username must be at least 3 characters");
        assert_eq!(
            validate_username(&"a".repeat(21)).unwrap_err(),
            "Username cannot exceed 20 characters"
        );
    }

    #[test]
    fn test_username_charset() {
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("alice-1").is_err());
        assert!(validate_username("ålice").is_err());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_age_bounds() {
        assert!(validate_age(17).is_err());
        assert!(validate_age(18).is_ok());
        assert!(validate_age(100).is_ok());
        assert!(validate_age(101).is_err());
    }

    #[test]
    fn test_room_name_is_trimmed_before_length_check() {
        assert!(validate_room_name("  ab  ").is_err());
        assert!(validate_room_name("  neon-lounge  ").is_ok());
        assert!(validate_room_name(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_message_content() {
        assert_eq!(validate_message_content("  hi  ").unwrap(), "hi");
        assert_eq!(validate_message_content("   ").unwrap_err(), "Message content is required");
        assert!(validate_message_content(&"x".repeat(501)).is_err());
        assert!(validate_message_content(&"x".repeat(500)).is_ok());
    }

    #[test]
    fn test_bio_and_description_bounds() {
        assert!(validate_bio(&"b".repeat(140)).is_ok());
        assert!(validate_bio(&"b".repeat(141)).is_err());
        assert!(validate_description(&"d".repeat(200)).is_ok());
        assert!(validate_description(&"d".repeat(201)).is_err());
    }
}
