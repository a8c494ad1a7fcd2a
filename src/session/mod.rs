//! Stateless session layer
//!
//! Sessions and CSRF state live entirely in HMAC-signed cookies. The server
//! keeps nothing but the signing secret and the allowlist.

mod allowlist;
mod cookie;
mod token;

pub use allowlist::Allowlist;
pub use cookie::{clear_cookie, parse_cookie_header, serialize_cookie, CookieOptions};
pub use token::{sign, sign_session, verify, verify_session, verify_session_at, SessionClaims, StateClaims};

/// Cookie carrying the signed session token
pub const SESSION_COOKIE: &str = "mm_session";

/// Cookie carrying the signed CSRF state for one login attempt
pub const STATE_COOKIE: &str = "mm_state";

/// Lifetime of the CSRF state cookie
pub const STATE_TTL_SECS: u64 = 300;

/// Default session lifetime (7 days)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted session lifetime (1 year)
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 3600;
