//! Process-wide configuration
//!
//! Read once at startup from the environment and shared read-only
//! (`Arc<AppConfig>`) with every request handler.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::session::{Allowlist, DEFAULT_SESSION_TTL_SECS, MAX_SESSION_TTL_SECS};

const MIN_SECRET_LEN: usize = 16;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 5;

/// Discord endpoints used by the login flow
#[derive(Debug, Clone)]
pub struct DiscordEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub user_url: String,
    pub cdn_base: String,
}

impl Default for DiscordEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://discord.com/oauth2/authorize".to_string(),
            token_url: "https://discord.com/api/oauth2/token".to_string(),
            user_url: "https://discord.com/api/users/@me".to_string(),
            cdn_base: "https://cdn.discordapp.com".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub allowlist: Allowlist,
    pub session_secret: Vec<u8>,
    /// Public origin, e.g. `https://mm.example.net`
    pub base_url: Option<String>,
    pub session_ttl_secs: u64,
    pub oauth_timeout: Duration,
    pub secure_cookies: bool,
    pub endpoints: DiscordEndpoints,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AppError::Config {
                message: format!("{} is not set", key),
            })
        };

        let client_id = require("DISCORD_CLIENT_ID")?;
        let client_secret = require("DISCORD_CLIENT_SECRET")?;
        let session_secret = require("SESSION_SECRET")?;
        if session_secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config {
                message: format!("SESSION_SECRET must be at least {} bytes", MIN_SECRET_LEN),
            });
        }

        let base_url = get("BASE_URL").map(|url| url.trim_end_matches('/').to_string());
        let redirect_uri = match (get("DISCORD_REDIRECT_URI"), &base_url) {
            (Some(uri), _) => uri,
            (None, Some(base)) => format!("{}/api/auth/callback", base),
            (None, None) => {
                return Err(AppError::Config {
                    message: "DISCORD_REDIRECT_URI or BASE_URL must be set".to_string(),
                })
            }
        };

        let allowlist = Allowlist::from_csv(&get("ALLOWLIST_IDS").unwrap_or_default());

        let session_ttl_secs =
            parse_or("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), DEFAULT_SESSION_TTL_SECS)?;
        if session_ttl_secs == 0 || session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(AppError::Config {
                message: format!(
                    "SESSION_TTL_SECS must be between 1 and {}, got {}",
                    MAX_SESSION_TTL_SECS, session_ttl_secs
                ),
            });
        }

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            allowlist,
            session_secret: session_secret.into_bytes(),
            base_url,
            session_ttl_secs,
            oauth_timeout: Duration::from_secs(parse_or(
                "OAUTH_TIMEOUT_SECS",
                get("OAUTH_TIMEOUT_SECS"),
                DEFAULT_OAUTH_TIMEOUT_SECS,
            )?),
            secure_cookies: parse_or("COOKIE_SECURE", get("COOKIE_SECURE"), true)?,
            endpoints: DiscordEndpoints::default(),
        })
    }

    /// Where the browser lands after the callback
    pub fn app_root(&self) -> String {
        match &self.base_url {
            Some(base) => format!("{}/", base),
            None => "/".to_string(),
        }
    }

    /// Value for `Access-Control-Allow-Origin`
    pub fn cors_origin(&self) -> &str {
        self.base_url.as_deref().unwrap_or("*")
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw.parse().map_err(|_| AppError::Config {
            message: format!("{} has an invalid value: {}", key, raw),
        }),
        None => Ok(default),
    }
}
