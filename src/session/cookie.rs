//! Cookie header parsing and `Set-Cookie` serialization

use std::collections::HashMap;
use std::fmt;

/// SameSite attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Lax => f.write_str("Lax"),
            SameSite::Strict => f.write_str("Strict"),
        }
    }
}

/// Attributes for an outbound cookie
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// `None` omits Max-Age (browser-session cookie), `Some(0)` expires immediately
    pub max_age: Option<u64>,
    pub http_only: bool,
    pub secure: bool,
    pub path: String,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            http_only: true,
            secure: true,
            path: "/".to_string(),
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    pub fn with_max_age(max_age: u64) -> Self {
        Self {
            max_age: Some(max_age),
            ..Self::default()
        }
    }
}

/// Parse individual `name=value` entries into a map.
///
/// Each entry is split on its first `=`. When a name repeats, the entry seen
/// last wins.
pub fn parse_cookies<'a, I>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cookies = HashMap::new();
    for entry in entries {
        let (name, value) = match entry.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (entry.trim(), ""),
        };
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_string(), value.to_string());
    }
    cookies
}

/// Parse one or more raw `Cookie:` header values (`a=1; b=2`)
pub fn parse_cookie_header<'a, I>(headers: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    parse_cookies(headers.into_iter().flat_map(|h| h.split(';')))
}

/// Build a `Set-Cookie` directive
pub fn serialize_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut cookie = format!(
        "{}={}; Path={}; SameSite={}",
        name, value, options.path, options.same_site
    );
    if options.http_only {
        cookie.push_str("; HttpOnly");
    }
    if options.secure {
        cookie.push_str("; Secure");
    }
    if let Some(max_age) = options.max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie
}

/// Build a directive that deletes `name` immediately
pub fn clear_cookie(name: &str, secure: bool) -> String {
    let options = CookieOptions {
        max_age: Some(0),
        secure,
        ..CookieOptions::default()
    };
    serialize_cookie(name, "", &options)
}
