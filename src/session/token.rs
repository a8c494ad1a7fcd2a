//! HMAC-signed tokens
//!
//! Token format: `base64url(json(payload)) + "." + hex(hmac_sha256(secret, base64url_part))`.
//! The signature covers the encoded body exactly as transmitted, so any change
//! to the body requires re-signing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Payload of the session cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Discord user id
    #[serde(rename = "sub")]
    pub subject: String,
    /// Display name captured at login
    pub name: String,
    /// Avatar hash captured at login
    #[serde(rename = "av", default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Unix timestamp (seconds) after which the session is rejected
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl SessionClaims {
    /// Claims expiring `ttl_secs` from now
    pub fn new(subject: String, name: String, avatar: Option<String>, ttl_secs: u64) -> Self {
        Self {
            subject,
            name,
            avatar: avatar.filter(|a| !a.is_empty()),
            expires_at: unix_now().saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)),
        }
    }
}

/// Payload of the CSRF state cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    pub nonce: String,
}

impl StateClaims {
    /// Fresh nonce from the OS CSPRNG
    pub fn generate() -> Self {
        Self {
            nonce: uuid::Uuid::new_v4().simple().to_string(),
        }
    }
}

fn mac(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|e| AppError::ServerError {
        message: format!("invalid HMAC key: {}", e),
    })
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Sign any serializable payload
pub fn sign<T: Serialize>(payload: &T, secret: &[u8]) -> Result<String> {
    let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
    let mut mac = mac(secret)?;
    mac.update(body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("{}.{}", body, signature))
}

/// Verify a token's signature and decode its payload
pub fn verify<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Result<T> {
    let (body, signature) = token.split_once('.').ok_or(AppError::Malformed)?;
    if body.is_empty() || signature.contains('.') {
        return Err(AppError::Malformed);
    }

    // Only the canonical lowercase encoding is accepted
    if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(AppError::InvalidSignature);
    }
    let signature = hex::decode(signature).map_err(|_| AppError::InvalidSignature)?;
    let mut mac = mac(secret)?;
    mac.update(body.as_bytes());
    // verify_slice compares in constant time
    mac.verify_slice(&signature)
        .map_err(|_| AppError::InvalidSignature)?;

    let json = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|_| AppError::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| AppError::Malformed)
}

pub fn sign_session(claims: &SessionClaims, secret: &[u8]) -> Result<String> {
    sign(claims, secret)
}

/// Verify a session token against the current time
pub fn verify_session(token: &str, secret: &[u8]) -> Result<SessionClaims> {
    verify_session_at(token, secret, unix_now())
}

/// Verify a session token; valid only while `now < expires_at`
pub fn verify_session_at(token: &str, secret: &[u8], now: i64) -> Result<SessionClaims> {
    let claims: SessionClaims = verify(token, secret)?;
    if claims.expires_at <= now {
        return Err(AppError::Expired);
    }
    Ok(claims)
}
