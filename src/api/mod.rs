mod accounts;
mod admin;
mod error;
mod home;
mod moderation;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::mail::MailQueue;
use crate::rate_limit::RateLimitState;
use crate::tokens::TokenConfig;

pub use accounts::{AccountSettings, AccountsState};
pub use error::{ApiError, ResultExt};

/// Create the application routes. Session resolution is layered on top by the caller.
pub fn create_router(
    db: Database,
    tokens: Arc<TokenConfig>,
    mail: MailQueue,
    settings: AccountSettings,
    rate_limits: RateLimitState,
) -> Router {
    let accounts_state = AccountsState {
        db: db.clone(),
        tokens,
        mail,
        settings: Arc::new(settings),
    };

    let admin_state = admin::AdminState { db: db.clone() };
    let moderation_state = moderation::ModerationState { db };

    Router::new()
        .merge(home::router())
        .merge(accounts::router(accounts_state, rate_limits))
        .nest("/admin", admin::router(admin_state))
        .nest("/moderate", moderation::router(moderation_state))
}
