use anyhow::Context;
use std::str::FromStr;

use crate::middleware::rate_limit::RateLimitConfig;

const DEV_JWT_SECRET: &str = "neon-dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Server configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub is_production: bool,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    /// Allowed CORS origins; empty means any origin
    pub client_origins: Vec<String>,
    pub log_format: LogFormat,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            is_production: false,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_days: 7,
            bcrypt_cost: 12,
            client_origins: Vec::new(),
            log_format: LogFormat::Pretty,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

pub(crate) fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let is_production = std::env::var("NODE_ENV")
            .or_else(|_| std::env::var("APP_ENV"))
            .map(|v| v == "production")
            .unwrap_or(false);

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if is_production => anyhow::bail!("JWT_SECRET must be set in production"),
            _ => {
                tracing::warn!("JWT_SECRET not set, using development secret");
                defaults.jwt_secret
            }
        };

        let client_origins = std::env::var("CLIENT_URL")
            .map(|urls| {
                urls.split(',')
                    .map(|u| u.trim().trim_end_matches('/').to_string())
                    .filter(|u| !u.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: env_or("PORT", defaults.port)?,
            is_production,
            jwt_secret,
            token_ttl_days: env_or("TOKEN_TTL_DAYS", defaults.token_ttl_days)?,
            bcrypt_cost: env_or("BCRYPT_COST", defaults.bcrypt_cost)?,
            client_origins,
            log_format: LogFormat::from_env(),
            rate_limit: RateLimitConfig::from_env()?,
        })
    }
}
