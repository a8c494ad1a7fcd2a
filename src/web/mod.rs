//! Web server for Discord login and the picks API
//!
//! Serves the session endpoints under `/api/auth/*`, the picks submission
//! endpoint, and optionally the static frontend.

mod oauth;
mod picks;
mod router;
mod server;

pub use oauth::DiscordClient;
pub use router::AuthRouter;
pub use server::{start_web_server, AppState, WebServerConfig};
