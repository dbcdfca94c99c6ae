pub mod id_generator;
pub mod validation;

pub use id_generator::{generate_message_id, generate_room_id, generate_user_id};
pub use validation::{
    validate_age, validate_bio, validate_description, validate_message_content, validate_password, validate_room_name,
    validate_username,
};
