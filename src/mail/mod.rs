//! Outgoing mail: message construction, transports and the delivery queue.

mod queue;
mod smtp;

use futures::future::BoxFuture;

pub use queue::{MailQueue, MailQueueConfig, deliver};
pub use smtp::{SmtpSettings, SmtpTransport};

/// Subject prefix for every message the application sends.
const SUBJECT_PREFIX: &str = "[Recipebook]";

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Something that can deliver a message.
pub trait MailTransport: Send + Sync {
    fn send<'a>(&'a self, mail: &'a OutgoingMail) -> BoxFuture<'a, Result<(), MailError>>;
}

/// Transport used when no SMTP server is configured: messages are only logged.
pub struct LogTransport;

impl MailTransport for LogTransport {
    fn send<'a>(&'a self, mail: &'a OutgoingMail) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            tracing::info!(
                to = %mail.to,
                subject = %mail.subject,
                body = %mail.text,
                "Mail transport not configured, logging message instead"
            );
            Ok(())
        })
    }
}

/// Build the account confirmation message.
pub fn confirmation_mail(to: &str, username: &str, link: &str, ttl_secs: u64) -> OutgoingMail {
    let minutes = ttl_secs.div_ceil(60);
    let text = format!(
        "Dear {username},\n\n\
         Welcome to Recipebook!\n\n\
         To confirm your account please click on the following link:\n\n\
         {link}\n\n\
         The link expires in {minutes} minutes.\n\n\
         Sincerely,\n\n\
         The Recipebook Team\n\n\
         Note: replies to this email address are not monitored.\n"
    );
    let html = format!(
        "<p>Dear {username},</p>\
         <p>Welcome to <b>Recipebook</b>!</p>\
         <p>To confirm your account please <a href=\"{link}\">click here</a>.</p>\
         <p>Alternatively, you can paste the following link in your browser's address bar:</p>\
         <p>{link}</p>\
         <p>The link expires in {minutes} minutes.</p>\
         <p>Sincerely,</p>\
         <p>The Recipebook Team</p>\
         <p><small>Note: replies to this email address are not monitored.</small></p>"
    );

    OutgoingMail {
        to: to.to_string(),
        subject: format!("{} Confirm Your Account", SUBJECT_PREFIX),
        text,
        html,
    }
}

/// Errors that can occur while delivering mail.
#[derive(Debug)]
pub enum MailError {
    /// Sender or recipient is not a valid mailbox
    Address(String),
    /// The message could not be assembled
    Build(String),
    /// The SMTP exchange failed
    Transport(String),
}

impl std::fmt::Display for MailError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailError::Address(e) => write!(f, "Invalid address: {}", e),
            MailError::Build(e) => write!(f, "Failed to build message: {}", e),
            MailError::Transport(e) => write!(f, "Failed to send message: {}", e),
        }
    }
}

impl std::error::Error for MailError {}
