//! Web server implementation for the showcase API

use std::any::Any;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::picks::submit_picks;
use super::router::{AuthRequest, AuthResponse, AuthRouter};
use crate::config::AppConfig;
use crate::session::parse_cookie_header;

/// Web server configuration
pub struct WebServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Certificate PEM file; TLS is enabled only when both paths are set
    pub cert_path: Option<PathBuf>,
    /// Private key PEM file
    pub key_path: Option<PathBuf>,
    /// Directory with the frontend, served for every non-API path
    pub static_dir: Option<PathBuf>,
}

impl WebServerConfig {
    /// Create config from CLI values plus TLS paths from the environment
    pub fn from_env(bind: IpAddr, port: u16, static_dir: Option<PathBuf>) -> Self {
        Self {
            bind,
            port,
            cert_path: std::env::var("TLS_CERT_PATH").ok().map(PathBuf::from),
            key_path: std::env::var("TLS_KEY_PATH").ok().map(PathBuf::from),
            static_dir,
        }
    }
}

/// Shared state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthRouter>,
}

impl AppState {
    pub fn new(auth: AuthRouter) -> Self {
        Self {
            config: auth.config(),
            auth: Arc::new(auth),
        }
    }
}

/// Build the application router
pub fn app(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/api/auth/*rest", any(auth_endpoint))
        .route("/api/picks", post(submit_picks))
        .with_state(state);

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router.fallback(not_found),
    };

    router
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
}

/// Start the web server
pub async fn start_web_server(config: WebServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::new(config.bind, config.port);
    let app = app(state, config.static_dir.clone());

    match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path)) => {
            info!("Loading TLS certificates:");
            info!("  Certificate: {}", cert_path.display());
            info!("  Private key: {}", key_path.display());

            let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .map_err(|e| anyhow::anyhow!(
                    "Failed to load TLS certificates: {}\n  Certificate: {}\n  Private key: {}",
                    e, cert_path.display(), key_path.display()
                ))?;

            info!("Web server listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service())
                .await?;
        }
        (None, None) => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Web server listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together"
            ));
        }
    }

    Ok(())
}

/// Cookies carried by every `Cookie:` header of the request
pub(super) fn request_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    parse_cookie_header(
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok()),
    )
}

/// ANY /api/auth/* - hand the request to the auth router
async fn auth_endpoint(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> AuthResponse {
    let request = AuthRequest {
        path: uri.path().to_string(),
        method,
        query,
        cookies: request_cookies(&headers),
    };
    state.auth.handle(request).await
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!("Dropping invalid response header {}", name),
            }
        }
        for cookie in &self.cookies {
            match HeaderValue::try_from(cookie.as_str()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(_) => warn!("Dropping invalid Set-Cookie value"),
            }
        }
        response
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" })))
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "server_error" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{sign_session, SessionClaims, SESSION_COOKIE, STATE_COOKIE};
    use crate::web::router::tests::{test_config, StubProvider, SECRET};
    use axum::body::to_bytes;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(allowlist: &str) -> Router {
        let auth = AuthRouter::new(
            Arc::new(test_config(allowlist)),
            Arc::new(StubProvider::approving("42")),
        );
        app(AppState::new(auth), None)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_login_sets_state_cookie_header() {
        let response = test_app("42")
            .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(response.headers().get(header::LOCATION).is_some());
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert!(cookies[0].to_str().unwrap().starts_with("mm_state="));
    }

    #[tokio::test]
    async fn test_full_flow_over_http() {
        let app = test_app("42");

        let response = app
            .clone()
            .oneshot(Request::get("/api/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
        let nonce = location.rsplit("state=").next().unwrap().to_string();
        let state_cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/auth/callback?code=abc&state={}", nonce))
                    .header(header::COOKIE, format!("theme=dark; {}", state_cookie))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(set_cookies.len(), 2);
        let session = set_cookies
            .iter()
            .find(|c| c.starts_with("mm_session="))
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        assert!(set_cookies.iter().any(|c| c.starts_with(&format!("{}=;", STATE_COOKIE))));

        let response = app
            .oneshot(
                Request::get("/api/auth/me")
                    .header(header::COOKIE, session)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        let json = json_body(response).await;
        assert_eq!(json["user"]["id"], "42");
    }

    #[tokio::test]
    async fn test_me_reads_session_cookie() {
        let claims = SessionClaims::new("42".into(), "Hiro".into(), None, 60);
        let token = sign_session(&claims, SECRET.as_bytes()).unwrap();

        let response = test_app("42")
            .oneshot(
                Request::get("/api/auth/me")
                    .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["name"], "Hiro");
    }

    #[tokio::test]
    async fn test_logout_link_clears_session_cookie() {
        let claims = SessionClaims::new("42".into(), "Hiro".into(), None, 60);
        let token = sign_session(&claims, SECRET.as_bytes()).unwrap();

        let response = test_app("42")
            .oneshot(
                Request::get("/api/auth/logout")
                    .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://mm.example.net/");
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        let cookie = cookies[0].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{}=;", SESSION_COOKIE)));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_unknown_paths_are_json_not_found() {
        for path in ["/api/auth/nope", "/elsewhere"] {
            let response = test_app("42")
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(json_body(response).await, json!({ "error": "not_found" }));
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_server_error() {
        let app: Router = Router::new()
            .route(
                "/boom",
                axum::routing::get(|| async {
                    if true {
                        panic!("boom");
                    }
                    "unreachable"
                }),
            )
            .layer(CatchPanicLayer::custom(panic_response));

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "error": "server_error" }));
    }
}
