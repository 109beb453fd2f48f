pub mod api;
pub mod auth;
pub mod cli;
pub mod confirmation;
pub mod db;
pub mod mail;
pub mod password;
pub mod permissions;
pub mod rate_limit;
pub mod tokens;

use api::{AccountSettings, create_router};
use auth::{SessionState, intercept};
use axum::{Router, http::HeaderName, middleware};
use db::Database;
use mail::{MailQueue, MailQueueConfig, MailTransport};
use rate_limit::{RateLimitConfig, RateLimitSettings, RateLimitState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokens::TokenConfig;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Key signing session and confirmation tokens
    pub secret_key: Vec<u8>,
    /// Public base URL, used for links in mail
    pub public_url: Url,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Lifetime of confirmation tokens in seconds
    pub confirm_ttl: u64,
    /// Registrations with this email receive the Administrator role
    pub admin_email: Option<String>,
    pub mail_transport: Arc<dyn MailTransport>,
    pub mail_queue: MailQueueConfig,
    pub rate_limits: RateLimitSettings,
    /// Trusted header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
}

/// Create the application router with the given configuration.
/// Starts the mail workers and the rate limit pruner, so it must be called
/// from within a Tokio runtime.
pub fn create_app(config: &ServerConfig) -> Router {
    let tokens = Arc::new(TokenConfig::new(&config.secret_key));
    let mail = MailQueue::start(config.mail_transport.clone(), config.mail_queue.clone());

    let rate_limits = RateLimitState {
        config: RateLimitConfig::new(config.rate_limits),
        ip_header: config.ip_header.clone(),
    };
    rate_limits.config.spawn_pruner();

    let settings = AccountSettings {
        public_url: config.public_url.clone(),
        confirm_ttl: config.confirm_ttl,
        admin_email: config.admin_email.clone(),
        secure_cookies: config.secure_cookies,
    };

    let session_state = SessionState {
        db: config.db.clone(),
        tokens: tokens.clone(),
    };

    create_router(config.db.clone(), tokens, mail, settings, rate_limits)
        .layer(middleware::from_fn_with_state(session_state, intercept))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
