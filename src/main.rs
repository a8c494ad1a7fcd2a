use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};

/// Discord-gated project showcase: login, session and picks API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind the web server to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, short = 'p', env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Directory with the frontend files, served for every non-API path
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

mod config;
mod error;
mod logging;
mod session;
mod web;

use config::AppConfig;
use web::{AppState, AuthRouter, DiscordClient, WebServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    logging::init(logging::LogFormat::from_flag(args.json_logs));

    let config = Arc::new(AppConfig::from_env().context("Failed to load configuration")?);

    info!("=== Discord OAuth Configuration ===");
    info!("Redirect URI: {}", config.redirect_uri);
    info!("Add it in Discord Developer Portal -> OAuth2 -> Redirects");
    if config.allowlist.is_empty() {
        warn!("ALLOWLIST_IDS is empty: every login will be denied");
    } else {
        info!("Allowlist loaded with {} ids", config.allowlist.len());
    }
    if !config.secure_cookies {
        warn!("COOKIE_SECURE=false: cookies will be sent over plain HTTP");
    }

    let discord = DiscordClient::new(&config).context("Failed to build Discord client")?;
    let auth = AuthRouter::new(config.clone(), Arc::new(discord));

    let web_config = WebServerConfig::from_env(args.bind, args.port, args.static_dir);
    if let Some(dir) = &web_config.static_dir {
        info!("Serving static files from {}", dir.display());
    }

    web::start_web_server(web_config, AppState::new(auth)).await?;

    warn!("Web server ended.");
    Ok(())
}
