//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::mail::{LogTransport, MailQueueConfig, MailTransport, SmtpSettings, SmtpTransport};
use crate::rate_limit::RateLimitSettings;
use crate::tokens::CONFIRM_TOKEN_DURATION_SECS;
use axum::http::HeaderName;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

const MIN_SECRET_KEY_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "Recipebook",
    about = "Recipe sharing with confirmed accounts and role-based permissions"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "recipebook.db")]
    pub database: String,

    /// Public base URL used in links sent by mail (e.g., "https://recipes.example.com")
    #[arg(long, default_value = "http://localhost:5000")]
    pub public_url: String,

    /// Path to file containing the signing key. Prefer using SECRET_KEY env var instead
    #[arg(long)]
    pub secret_key_file: Option<String>,

    /// Lifetime of confirmation links in seconds
    #[arg(long, default_value_t = CONFIRM_TOKEN_DURATION_SECS)]
    pub confirm_ttl: u64,

    /// Accounts registered with this email become administrators
    #[arg(long, env = "RECIPEBOOK_ADMIN")]
    pub admin_email: Option<String>,

    /// SMTP server host
    #[arg(long, env = "MAIL_SERVER", default_value = "smtp.googlemail.com")]
    pub mail_server: String,

    /// SMTP server port
    #[arg(long, env = "MAIL_PORT", default_value = "587")]
    pub mail_port: u16,

    /// SMTP username. Without it mail is only logged. Password is read from MAIL_PASSWORD
    #[arg(long, env = "MAIL_USERNAME")]
    pub mail_username: Option<String>,

    /// Sender address for outgoing mail
    #[arg(long, env = "MAIL_SENDER", default_value = "Recipebook Admin <recipebook@example.com>")]
    pub mail_sender: String,

    /// Disable STARTTLS for the SMTP connection
    #[arg(long)]
    pub mail_no_tls: bool,

    /// Number of mail delivery workers
    #[arg(long, default_value = "2")]
    pub mail_workers: usize,

    /// Messages held in the delivery queue before new ones are dropped
    #[arg(long, default_value = "256")]
    pub mail_queue_capacity: usize,

    /// Timeout for a single delivery attempt in seconds
    #[arg(long, default_value = "10")]
    pub mail_timeout: u64,

    /// Take the client IP from this header (only behind a trusted proxy, e.g. "x-forwarded-for")
    #[arg(long, value_parser = parse_header_name)]
    pub ip_header: Option<HeaderName>,

    /// Login attempts allowed per minute from one address
    #[arg(long, default_value = "10")]
    pub login_rate: u32,

    /// Registrations allowed per minute from one address
    #[arg(long, default_value = "3")]
    pub register_rate: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn parse_header_name(s: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(s.trim().as_bytes())
        .map_err(|e| format!("Invalid header name '{}': {}", s, e))
}

/// Initialize logging based on the specified format. `RUST_LOG` overrides the default level.
pub fn init_logging(format: &LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Load the signing key from environment variable or file.
/// Returns None and logs an error if the key cannot be loaded.
/// Must run before any other thread is started.
pub fn load_secret_key(secret_key_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("SECRET_KEY") {
        // Clear the environment variable to prevent leaking
        // SAFETY: Called from `main` before the Tokio runtime is built, so no
        // other thread exists yet to read the environment concurrently.
        unsafe { std::env::remove_var("SECRET_KEY") };
        secret
    } else if let Some(path) = secret_key_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret key file");
                return None;
            }
        }
    } else {
        error!(
            "Secret key is required. Set SECRET_KEY environment variable (recommended) or use --secret-key-file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_KEY_LENGTH {
        error!(
            "Secret key is shorter than {} characters. Use a longer key",
            MIN_SECRET_KEY_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the public URL.
/// Returns None and logs an error if validation fails.
pub fn validate_public_url(public_url: &str) -> Option<Url> {
    let url = match Url::parse(public_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %public_url, error = %e, "Invalid public URL");
            return None;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        error!(url = %public_url, "Public URL must use http or https");
        return None;
    }

    if url.scheme() == "http" && url.host_str() != Some("localhost") {
        warn!(url = %public_url, "Public URL is not HTTPS; session cookies will not be marked Secure");
    }

    Some(url)
}

/// Read the SMTP password from `MAIL_PASSWORD` and clear it from the environment.
/// Must run before any other thread is started.
pub fn take_mail_password() -> String {
    let password = std::env::var("MAIL_PASSWORD").unwrap_or_default();
    // SAFETY: Called from `main` before the Tokio runtime is built, so no
    // other thread exists yet to read the environment concurrently.
    unsafe { std::env::remove_var("MAIL_PASSWORD") };
    password
}

/// Pick the mail transport: SMTP when credentials are configured, logging otherwise.
/// Returns None and logs an error if the SMTP settings are invalid.
/// The SMTP pool spawns its own task, so this must run inside the runtime.
pub fn build_mail_transport(args: &Args, password: String) -> Option<Arc<dyn MailTransport>> {
    let Some(username) = args.mail_username.clone() else {
        warn!("No mail username configured, confirmation mail will only be logged");
        return Some(Arc::new(LogTransport));
    };

    let settings = SmtpSettings {
        server: args.mail_server.clone(),
        port: args.mail_port,
        username,
        password,
        use_tls: !args.mail_no_tls,
        sender: args.mail_sender.clone(),
    };

    match SmtpTransport::new(&settings) {
        Ok(transport) => {
            info!(server = %settings.server, port = settings.port, "SMTP transport configured");
            Some(Arc::new(transport))
        }
        Err(e) => {
            error!(server = %settings.server, error = %e, "Invalid mail settings");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    public_url: Url,
    secret_key: String,
    mail_transport: Arc<dyn MailTransport>,
) -> ServerConfig {
    let secure_cookies = public_url.scheme() == "https";

    ServerConfig {
        db,
        secret_key: secret_key.into_bytes(),
        public_url,
        secure_cookies,
        confirm_ttl: args.confirm_ttl,
        admin_email: args.admin_email.clone(),
        mail_transport,
        mail_queue: MailQueueConfig {
            workers: args.mail_workers,
            capacity: args.mail_queue_capacity,
            timeout: Duration::from_secs(args.mail_timeout),
            ..MailQueueConfig::default()
        },
        rate_limits: RateLimitSettings {
            login_per_minute: args.login_rate,
            register_per_minute: args.register_rate,
        },
        ip_header: args.ip_header.clone(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
