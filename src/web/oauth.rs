//! Discord OAuth2 authorization-code grant

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{AppError, Result};

/// Discord OAuth token response
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Discord user info from /users/@me
#[derive(Deserialize, Debug, Clone)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    pub global_name: Option<String>,
    pub avatar: Option<String>,
}

impl DiscordUser {
    /// Global display name, falling back to the username
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// The two outbound calls of the authorization-code grant
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse>;

    async fn fetch_identity(&self, access_token: &str, token_type: &str) -> Result<DiscordUser>;
}

/// Discord API client
#[derive(Clone)]
pub struct DiscordClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
    user_url: String,
    http_client: reqwest::Client,
}

impl DiscordClient {
    /// Build a client whose requests are bounded by the configured timeout
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.oauth_timeout)
            .build()
            .map_err(|e| AppError::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: config.endpoints.token_url.clone(),
            user_url: config.endpoints.user_url.clone(),
            http_client,
        })
    }
}

/// Read a failed response into `"<status>: <body>"`
async fn upstream_failure(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    format!("{}: {}", status, body)
}

#[async_trait]
impl OAuthProvider for DiscordClient {
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let failed = |detail: String| AppError::TokenExchangeFailed { detail };

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| failed(format!("request error: {}", e)))?;

        if !response.status().is_success() {
            return Err(failed(upstream_failure(response).await));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("invalid token response: {}", e)))?;

        debug!("Exchanged authorization code for {} token", token.token_type);
        Ok(token)
    }

    async fn fetch_identity(&self, access_token: &str, token_type: &str) -> Result<DiscordUser> {
        let failed = |detail: String| AppError::IdentityFetchFailed { detail };

        let response = self
            .http_client
            .get(&self.user_url)
            .header("Authorization", format!("{} {}", token_type, access_token))
            .send()
            .await
            .map_err(|e| failed(format!("request error: {}", e)))?;

        if !response.status().is_success() {
            return Err(failed(upstream_failure(response).await));
        }

        response
            .json()
            .await
            .map_err(|e| failed(format!("invalid user response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, timeout: Duration) -> DiscordClient {
        let mut config = AppConfig::from_lookup(|key| match key {
            "DISCORD_CLIENT_ID" => Some("client-1".to_string()),
            "DISCORD_CLIENT_SECRET" => Some("secret-1".to_string()),
            "SESSION_SECRET" => Some("0123456789abcdef0123".to_string()),
            "DISCORD_REDIRECT_URI" => Some("https://mm.example.net/api/auth/callback".to_string()),
            _ => None,
        })
        .unwrap();
        config.oauth_timeout = timeout;
        config.endpoints.token_url = format!("{}/api/oauth2/token", server.uri());
        config.endpoints.user_url = format!("{}/api/users/@me", server.uri());
        DiscordClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc123"))
            .and(body_string_contains("client_id=client-1"))
            .and(body_string_contains("client_secret=secret-1"))
            .and(body_string_contains(
                "redirect_uri=https%3A%2F%2Fmm.example.net%2Fapi%2Fauth%2Fcallback",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-xyz",
                "token_type": "Bearer",
                "expires_in": 604800,
                "scope": "identify"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let token = client.exchange_code("abc123").await.unwrap();
        assert_eq!(token.access_token, "at-xyz");
        assert_eq!(token.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_exchange_code_failure_carries_upstream_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("{\"error\":\"invalid_grant\"}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        match client.exchange_code("used-code").await {
            Err(AppError::TokenExchangeFailed { detail }) => {
                assert!(detail.starts_with("400"));
                assert!(detail.contains("invalid_grant"));
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.access_token)),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(200));
        assert!(matches!(
            client.exchange_code("slow").await,
            Err(AppError::TokenExchangeFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_identity_sends_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/@me"))
            .and(header("Authorization", "Bearer at-xyz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "42",
                "username": "hiro",
                "global_name": "Hiro",
                "avatar": "a1b2c3",
                "discriminator": "0"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        let user = client.fetch_identity("at-xyz", "Bearer").await.unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.display_name(), "Hiro");
        assert_eq!(user.avatar.as_deref(), Some("a1b2c3"));
    }

    #[tokio::test]
    async fn test_fetch_identity_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/@me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("401: Unauthorized"))
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(5));
        match client.fetch_identity("expired", "Bearer").await {
            Err(AppError::IdentityFetchFailed { detail }) => assert!(detail.contains("Unauthorized")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_identity_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/@me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "42", "username": "hiro" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_millis(200));
        assert!(matches!(
            client.fetch_identity("at-xyz", "Bearer").await,
            Err(AppError::IdentityFetchFailed { .. })
        ));
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let user = DiscordUser {
            id: "1".to_string(),
            username: "plain".to_string(),
            global_name: None,
            avatar: None,
        };
        assert_eq!(user.display_name(), "plain");
    }
}
