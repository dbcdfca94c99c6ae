use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;

use super::token::TokenService;
use crate::error::{AppError, AppResult};
use crate::models::{Gender, Interest, InterestedIn, NewUser, PublicProfile, User, UserStatus};
use crate::store::{Store, StoreError};
use crate::utils::{generate_user_id, validate_age, validate_bio, validate_password, validate_username};

/// Registration body as received over the wire
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub interested_in: Option<Vec<String>>,
    pub bio: Option<String>,
    pub interests: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Issued token plus the profile it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct AuthSession {
    pub token: String,
    pub user: PublicProfile,
}

fn parse_enum<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_string())).ok()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl RegisterRequest {
    /// Checks every field and collects one message per problem.
    /// The password is returned alongside so it can be hashed off-thread.
    fn validate(&self) -> AppResult<(NewUser, String)> {
        let (Some(username), Some(password), Some(age), Some(gender)) = (
            non_blank(&self.username),
            self.password.as_deref().filter(|p| !p.is_empty()),
            self.age,
            non_blank(&self.gender),
        ) else {
            return Err(AppError::validation("Please fill in all required fields"));
        };

        let mut errors = Vec::new();
        if let Err(msg) = validate_username(username) {
            errors.push(msg.to_string());
        }
        if let Err(msg) = validate_password(password) {
            errors.push(msg.to_string());
        }
        if let Err(msg) = validate_age(age) {
            errors.push(msg.to_string());
        }

        let gender = parse_enum::<Gender>(gender);
        if gender.is_none() {
            errors.push("Gender must be male, female, non-binary, or prefer-not-to-say".to_string());
        }

        let interested_in = match &self.interested_in {
            Some(values) if !values.is_empty() => {
                let parsed: Option<Vec<InterestedIn>> = values.iter().map(|v| parse_enum(v)).collect();
                parsed.unwrap_or_else(|| {
                    errors.push("Invalid interestedIn value".to_string());
                    Vec::new()
                })
            }
            _ => vec![InterestedIn::Everyone],
        };

        let interests = match &self.interests {
            Some(values) => {
                let parsed: Option<Vec<Interest>> = values.iter().map(|v| parse_enum(v)).collect();
                parsed.unwrap_or_else(|| {
                    errors.push("Invalid interest value".to_string());
                    Vec::new()
                })
            }
            None => Vec::new(),
        };

        let bio = self.bio.as_deref().map(str::trim).unwrap_or_default().to_string();
        if let Err(msg) = validate_bio(&bio) {
            errors.push(msg.to_string());
        }

        match (errors.is_empty(), gender, u8::try_from(age)) {
            (true, Some(gender), Ok(age)) => Ok((
                NewUser {
                    username: username.to_lowercase(),
                    password_hash: String::new(),
                    age,
                    gender,
                    interested_in,
                    bio,
                    interests,
                },
                password.to_string(),
            )),
            _ => Err(AppError::invalid_fields(errors)),
        }
    }
}

/// Account lifecycle: registration, credentials, token authentication, status
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, tokens: TokenService, bcrypt_cost: u32) -> Self {
        Self {
            store,
            tokens,
            bcrypt_cost,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthSession> {
        let (mut new_user, password) = request.validate()?;

        if self.store.find_user_by_username(&new_user.username).await?.is_some() {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        new_user.password_hash = self.hash_password(password).await?;

        let user = self
            .store
            .insert_user(User::new(generate_user_id(), new_user))
            .await
            .map_err(|err| match err {
                StoreError::Duplicate(_) => AppError::Conflict("Username already taken".to_string()),
                other => other.into(),
            })?;

        tracing::info!("User registered: {} ({})", user.username, user.id);

        Ok(AuthSession {
            token: self.tokens.issue_token(&user.id)?,
            user: user.public_profile(),
        })
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthSession> {
        let (Some(username), Some(password)) = (non_blank(&request.username), request.password) else {
            return Err(AppError::validation("Please provide username and password"));
        };

        let user = self
            .store
            .find_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::Auth("Invalid credentials".to_string()))?;

        if !user.is_active {
            return Err(AppError::Auth("Account is deactivated".to_string()));
        }

        if !self.verify_password(password, user.password_hash.clone()).await? {
            tracing::debug!("Failed login attempt for {}", user.username);
            return Err(AppError::Auth("Invalid credentials".to_string()));
        }

        let user = self.set_status(&user.id, UserStatus::Online).await?;
        tracing::info!("User logged in: {}", user.username);

        Ok(AuthSession {
            token: self.tokens.issue_token(&user.id)?,
            user: user.public_profile(),
        })
    }

    /// Resolves a bearer token to an active account
    pub async fn authenticate(&self, token: &str) -> AppResult<User> {
        let user_id = self.tokens.verify_token(token)?;
        let user = self
            .store
            .find_user(&user_id)
            .await?
            .ok_or_else(|| AppError::Auth("User not found".to_string()))?;

        if !user.is_active {
            return Err(AppError::Auth("Account is deactivated".to_string()));
        }
        Ok(user)
    }

    /// Persists a status change and refreshes the activity timestamp
    pub async fn set_status(&self, user_id: &str, status: UserStatus) -> AppResult<User> {
        self.store
            .update_user(
                user_id,
                Box::new(move |user| {
                    user.set_status(status);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn hash_password(&self, password: String) -> AppResult<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| AppError::Internal(format!("Hashing task failed: {}", err)))?
            .map_err(|err| AppError::Internal(format!("Password hashing failed: {}", err)))
    }

    async fn verify_password(&self, password: String, hash: String) -> AppResult<bool> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|err| AppError::Internal(format!("Hashing task failed: {}", err)))?
            .map_err(|err| AppError::Internal(format!("Password check failed: {}", err)))
    }
}
