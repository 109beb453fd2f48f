//! Account confirmation.
//!
//! An account starts `Unconfirmed` and moves to `Confirmed` exactly once, when
//! its owner presents a valid token minted for their own id. There is no way
//! back.

use tracing::{info, warn};

use crate::db::{Database, User};
use crate::tokens::TokenConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Unconfirmed,
    Confirmed,
}

impl ConfirmationState {
    pub fn of(user: &User) -> Self {
        if user.confirmed {
            ConfirmationState::Confirmed
        } else {
            ConfirmationState::Unconfirmed
        }
    }
}

/// Successful result of [`confirm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// This call performed the transition.
    Confirmed,
    /// The account was already confirmed; nothing changed.
    AlreadyConfirmed,
}

#[derive(Debug)]
pub enum ConfirmError {
    /// Bad signature, expired, or minted for someone else
    InvalidToken,
    Database(sqlx::Error),
}

impl std::fmt::Display for ConfirmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfirmError::InvalidToken => {
                write!(f, "The confirmation link is invalid or has expired")
            }
            ConfirmError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for ConfirmError {}

/// Confirm `user`'s account with `token`.
///
/// An already-confirmed account short-circuits to `AlreadyConfirmed` without
/// looking at the token.
pub async fn confirm(
    db: &Database,
    tokens: &TokenConfig,
    user: &User,
    token: &str,
) -> Result<ConfirmOutcome, ConfirmError> {
    if ConfirmationState::of(user) == ConfirmationState::Confirmed {
        return Ok(ConfirmOutcome::AlreadyConfirmed);
    }

    let token_user_id = tokens.decode_confirmation(token).map_err(|e| {
        warn!(user_id = user.id, error = %e, "Rejected confirmation token");
        ConfirmError::InvalidToken
    })?;

    if token_user_id != user.id {
        warn!(
            user_id = user.id,
            token_user_id, "Confirmation token was minted for another account"
        );
        return Err(ConfirmError::InvalidToken);
    }

    let changed = db
        .users()
        .mark_confirmed(user.id)
        .await
        .map_err(ConfirmError::Database)?;

    if changed {
        info!(user_id = user.id, "Account confirmed");
        Ok(ConfirmOutcome::Confirmed)
    } else {
        // A concurrent request got there first.
        Ok(ConfirmOutcome::AlreadyConfirmed)
    }
}
