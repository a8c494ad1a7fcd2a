//! Auth request router
//!
//! Dispatches `/api/auth/*` requests to the login, callback, me and logout
//! handlers. Requests and responses are plain values so the whole flow can be
//! driven without a socket; `server.rs` adapts them to axum.
//!
//! Login flow: anonymous → state issued (`mm_state` cookie) → callback
//! (ok / denied / invalid) → session active (`mm_session` cookie) or back to
//! anonymous.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::oauth::OAuthProvider;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::session::{
    self, clear_cookie, serialize_cookie, sign_session, verify_session, CookieOptions,
    SessionClaims, StateClaims, SESSION_COOKIE, STATE_COOKIE, STATE_TTL_SECS,
};

/// Inbound request as seen by the auth handlers
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub path: String,
    pub method: Method,
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl AuthRequest {
    fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Outbound response; every entry of `cookies` becomes its own `Set-Cookie`
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub status: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub cookies: Vec<String>,
    pub body: String,
}

impl AuthResponse {
    fn json(status: StatusCode, body: serde_json::Value, cors_origin: &str) -> Self {
        let headers = BTreeMap::from([
            ("Content-Type".to_string(), "application/json; charset=utf-8".to_string()),
            ("Access-Control-Allow-Origin".to_string(), cors_origin.to_string()),
            ("Access-Control-Allow-Credentials".to_string(), "true".to_string()),
            ("Cache-Control".to_string(), "no-store".to_string()),
        ]);
        Self {
            status,
            headers,
            cookies: Vec::new(),
            body: body.to_string(),
        }
    }

    fn redirect(location: &str, cookies: Vec<String>) -> Self {
        Self {
            status: StatusCode::FOUND,
            headers: BTreeMap::from([("Location".to_string(), location.to_string())]),
            cookies,
            body: String::new(),
        }
    }

    fn with_cookie(mut self, cookie: String) -> Self {
        self.cookies.push(cookie);
        self
    }

}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Login,
    Callback,
    Me,
    Logout,
}

impl Route {
    /// Match on path suffix, ignoring a trailing slash
    fn from_path(path: &str) -> Option<Self> {
        let path = path.strip_suffix('/').unwrap_or(path);
        if path.ends_with("/api/auth/login") {
            Some(Route::Login)
        } else if path.ends_with("/api/auth/callback") {
            Some(Route::Callback)
        } else if path.ends_with("/api/auth/me") || path.ends_with("/api/auth/session") {
            Some(Route::Me)
        } else if path.ends_with("/api/auth/logout") {
            Some(Route::Logout)
        } else {
            None
        }
    }
}

/// Stateless router over the immutable config and an OAuth provider
pub struct AuthRouter {
    config: Arc<AppConfig>,
    provider: Arc<dyn OAuthProvider>,
}

impl AuthRouter {
    pub fn new(config: Arc<AppConfig>, provider: Arc<dyn OAuthProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub async fn handle(&self, req: AuthRequest) -> AuthResponse {
        match self.dispatch(&req).await {
            Ok(response) => response,
            Err(err) => self.error_response(&req, err),
        }
    }

    async fn dispatch(&self, req: &AuthRequest) -> Result<AuthResponse> {
        match Route::from_path(&req.path) {
            Some(Route::Login) => self.login(),
            Some(Route::Callback) => self.callback(req).await,
            Some(Route::Me) => Ok(self.me(req)),
            Some(Route::Logout) => Ok(self.logout(&req.method)),
            None => Err(AppError::NotFound {
                method: req.method.to_string(),
                path: req.path.clone(),
            }),
        }
    }

    fn cookie_options(&self, max_age: u64) -> CookieOptions {
        CookieOptions {
            secure: self.config.secure_cookies,
            ..CookieOptions::with_max_age(max_age)
        }
    }

    fn clear(&self, name: &str) -> String {
        clear_cookie(name, self.config.secure_cookies)
    }

    /// GET /api/auth/login - issue CSRF state and send the browser to Discord
    fn login(&self) -> Result<AuthResponse> {
        let state = StateClaims::generate();
        let signed = session::sign(&state, &self.config.session_secret)?;

        let authorize_url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope=identify&state={}",
            self.config.endpoints.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&state.nonce)
        );

        Ok(AuthResponse::redirect(
            &authorize_url,
            vec![serialize_cookie(
                STATE_COOKIE,
                &signed,
                &self.cookie_options(STATE_TTL_SECS),
            )],
        ))
    }

    /// GET /api/auth/callback - validate state, then complete the grant
    async fn callback(&self, req: &AuthRequest) -> Result<AuthResponse> {
        let code = req
            .query_param("code")
            .ok_or(AppError::MissingParameter { name: "code" })?;
        let state = req
            .query_param("state")
            .ok_or(AppError::MissingParameter { name: "state" })?;
        let saved = req
            .cookie(STATE_COOKIE)
            .ok_or(AppError::MissingParameter { name: STATE_COOKIE })?;

        let issued: StateClaims = session::verify(saved, &self.config.session_secret)
            .map_err(|e| {
                debug!("State cookie rejected: {}", e);
                AppError::StateMismatch
            })?;
        if issued.nonce != state {
            return Err(AppError::StateMismatch);
        }

        // The state is consumed from here on, whatever the outcome
        match self.complete_login(code).await {
            Ok(response) => Ok(response.with_cookie(self.clear(STATE_COOKIE))),
            Err(err) => Ok(self.error_response(req, err).with_cookie(self.clear(STATE_COOKIE))),
        }
    }

    async fn complete_login(&self, code: &str) -> Result<AuthResponse> {
        let token = self.provider.exchange_code(code).await?;
        let user = self
            .provider
            .fetch_identity(&token.access_token, &token.token_type)
            .await?;

        let app_root = self.config.app_root();

        if !self.config.allowlist.is_allowed(&user.id) {
            // Denied logins look exactly like anonymous browsing to the caller
            warn!("Login denied: {} ({}) is not on the allowlist", user.id, user.username);
            return Ok(AuthResponse::redirect(&app_root, Vec::new()));
        }

        let claims = SessionClaims::new(
            user.id.clone(),
            user.display_name().to_string(),
            user.avatar.clone(),
            self.config.session_ttl_secs,
        );
        let token = sign_session(&claims, &self.config.session_secret)?;

        info!("Session issued for {} ({})", user.id, user.username);

        Ok(AuthResponse::redirect(
            &app_root,
            vec![serialize_cookie(
                SESSION_COOKIE,
                &token,
                &self.cookie_options(self.config.session_ttl_secs),
            )],
        ))
    }

    /// GET /api/auth/me - describe the current session
    fn me(&self, req: &AuthRequest) -> AuthResponse {
        let claims = req
            .cookie(SESSION_COOKIE)
            .ok_or(AppError::Malformed)
            .and_then(|token| verify_session(token, &self.config.session_secret));

        match claims {
            Ok(claims) => {
                let avatar = self.avatar_url(&claims);
                AuthResponse::json(
                    StatusCode::OK,
                    json!({
                        "authenticated": true,
                        "user": { "id": claims.subject, "name": claims.name, "avatar": avatar }
                    }),
                    self.config.cors_origin(),
                )
            }
            Err(e) => {
                debug!("Session rejected: {}", e);
                AuthResponse::json(
                    StatusCode::UNAUTHORIZED,
                    json!({ "authenticated": false }),
                    self.config.cors_origin(),
                )
            }
        }
    }

    fn avatar_url(&self, claims: &SessionClaims) -> String {
        let cdn = &self.config.endpoints.cdn_base;
        match claims.avatar.as_deref().filter(|a| !a.is_empty()) {
            Some(hash) => format!("{}/avatars/{}/{}.png?size=128", cdn, claims.subject, hash),
            None => format!("{}/embed/avatars/0.png", cdn),
        }
    }

    /// /api/auth/logout - drop the session cookie.
    ///
    /// POST answers with JSON for script callers; any other method is a
    /// browser navigation and gets sent back to the app root.
    fn logout(&self, method: &Method) -> AuthResponse {
        let cleared = self.clear(SESSION_COOKIE);
        if method == Method::POST {
            AuthResponse::json(StatusCode::OK, json!({ "ok": true }), self.config.cors_origin())
                .with_cookie(cleared)
        } else {
            AuthResponse::redirect(&self.config.app_root(), vec![cleared])
        }
    }

    fn error_response(&self, req: &AuthRequest, err: AppError) -> AuthResponse {
        let status = err.status();
        if status.is_server_error() {
            error!("{} {} failed: {}", req.method, req.path, err);
        } else {
            warn!("{} {} rejected: {}", req.method, req.path, err);
        }

        let mut body = json!({ "error": err.reason() });
        if let Some(detail) = err.upstream_detail() {
            body["detail"] = json!(detail);
        }

        AuthResponse::json(status, body, self.config.cors_origin())
    }
}
