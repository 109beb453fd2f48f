//! Account endpoints: registration, login, logout and email confirmation.
//!
//! Registration: POST `/register` → account stored unconfirmed → confirmation
//! mail queued with `{public_url}/confirm/{token}`.
//! Confirmation: GET `/confirm/{token}` while signed in as the same account.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use super::error::{ApiError, ResultExt};
use crate::auth::{AuthError, CurrentUser, MaybeUser, clear_session_cookie, session_cookie};
use crate::confirmation::{self, ConfirmError, ConfirmOutcome};
use crate::db::{ADMINISTRATOR_ROLE, Database, NewUser};
use crate::mail::{MailQueue, confirmation_mail};
use crate::password;
use crate::rate_limit::{RateLimitState, rate_limit_login, rate_limit_register};
use crate::tokens::TokenConfig;

const MAX_FIELD_LEN: usize = 64;

/// Settings fixed at startup.
pub struct AccountSettings {
    /// Base for absolute links in mail
    pub public_url: Url,
    /// Lifetime of confirmation tokens in seconds
    pub confirm_ttl: u64,
    /// Registrations with this email receive the Administrator role
    pub admin_email: Option<String>,
    pub secure_cookies: bool,
}

#[derive(Clone)]
pub struct AccountsState {
    pub db: Database,
    pub tokens: Arc<TokenConfig>,
    pub mail: MailQueue,
    pub settings: Arc<AccountSettings>,
}

impl AccountsState {
    fn confirmation_link(&self, token: &str) -> String {
        format!(
            "{}/confirm/{}",
            self.settings.public_url.as_str().trim_end_matches('/'),
            token
        )
    }

    fn is_admin_email(&self, email: &str) -> bool {
        self.settings
            .admin_email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(email))
    }
}

pub fn router(state: AccountsState, rate_limits: RateLimitState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limits.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(rate_limits, rate_limit_login));

    Router::new()
        .route("/logout", get(logout))
        .route("/confirm/{token}", get(confirm))
        .route("/unconfirmed", get(unconfirmed))
        .with_state(state)
        .merge(register_router)
        .merge(login_router)
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required"));
    }
    if email.len() > MAX_FIELD_LEN {
        return Err(ApiError::bad_request("Email cannot be longer than 64 characters"));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(())
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    if username.len() > MAX_FIELD_LEN {
        return Err(ApiError::bad_request("Username cannot be longer than 64 characters"));
    }

    let mut chars = username.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(ApiError::bad_request(
            "Usernames must have only letters, numbers, dots or underscores",
        ));
    }
    Ok(())
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    username: String,
    password: String,
    password2: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
    username: String,
    message: &'static str,
}

async fn register(
    State(state): State<AccountsState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let username = payload.username.trim();

    validate_email(email)?;
    validate_username(username)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }
    if payload.password != payload.password2 {
        return Err(ApiError::bad_request("Passwords must match"));
    }

    let users = state.db.users();
    if users
        .email_taken(email)
        .await
        .db_err("Failed to check email")?
    {
        return Err(ApiError::conflict("Email already registered"));
    }
    if users
        .username_taken(username)
        .await
        .db_err("Failed to check username")?
    {
        return Err(ApiError::conflict("Username already in use"));
    }

    let role = if state.is_admin_email(email) {
        state.db.roles().find_by_name(ADMINISTRATOR_ROLE).await
    } else {
        state.db.roles().default_role().await
    }
    .db_err("Failed to load role")?
    .ok_or_else(|| ApiError::internal_error("Failed to load role", "role table is not seeded"))?;

    let password_hash = password::hash(payload.password)
        .await
        .internal_err("Failed to hash password")?;

    let id = match users
        .insert(&NewUser {
            email,
            username,
            password_hash: &password_hash,
            role_id: role.id,
        })
        .await
    {
        Ok(id) => id,
        // Lost a race with a concurrent registration.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::conflict("Email or username already in use"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    };

    let token = state
        .tokens
        .mint_confirmation(id, state.settings.confirm_ttl)
        .internal_err("Failed to mint confirmation token")?;
    let link = state.confirmation_link(&token);
    state.mail.enqueue(confirmation_mail(
        email,
        username,
        &link,
        state.settings.confirm_ttl,
    ));

    info!(user_id = id, username = %username, role = %role.name, "Registered account");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            username: username.to_string(),
            message: "A confirmation email has been sent to you by email.",
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
    #[serde(default)]
    remember_me: bool,
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    next: String,
    username: String,
}

/// Only local paths are honored; `//host` would leave the site.
fn local_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

async fn login(
    State(state): State<AccountsState>,
    Query(query): Query<LoginQuery>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .db
        .users()
        .find_by_email(payload.email.trim())
        .await
        .db_err("Failed to look up user")?;

    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let verified = password::verify(payload.password, stored_hash).await;

    let user = match user {
        Some(user) if verified => user,
        _ => {
            warn!("Failed login attempt");
            return Ok(AuthError::InvalidCredentials.into_response());
        }
    };

    let session = state
        .tokens
        .issue_session(user.id, payload.remember_me)
        .internal_err("Failed to issue session")?;
    let cookie = session_cookie(
        &session.token,
        session.max_age,
        state.settings.secure_cookies,
    );

    info!(user_id = user.id, remember = payload.remember_me, "User logged in");

    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            next: local_next(query.next.as_deref()).to_string(),
            username: user.username,
        }),
    )
        .into_response())
}

async fn logout(State(state): State<AccountsState>, CurrentUser(user): CurrentUser) -> Response {
    info!(user_id = user.id, "User logged out");
    (
        [(SET_COOKIE, clear_session_cookie(state.settings.secure_cookies))],
        Json(MessageResponse {
            message: "You have been logged out.",
        }),
    )
        .into_response()
}

async fn confirm(
    State(state): State<AccountsState>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    match confirmation::confirm(&state.db, &state.tokens, &user, &token).await {
        Ok(ConfirmOutcome::Confirmed) => Ok(Json(MessageResponse {
            message: "You have confirmed your account. Thanks!",
        })
        .into_response()),
        Ok(ConfirmOutcome::AlreadyConfirmed) => Ok(Redirect::temporary("/").into_response()),
        Err(ConfirmError::InvalidToken) => Err(ApiError::bad_request(
            "The confirmation link is invalid or has expired.",
        )),
        Err(ConfirmError::Database(e)) => Err(ApiError::db_error("Failed to confirm account", e)),
    }
}

#[derive(Serialize)]
struct UnconfirmedResponse {
    username: String,
    email: String,
    message: &'static str,
}

async fn unconfirmed(MaybeUser(user): MaybeUser) -> Response {
    match user {
        Some(user) if !user.confirmed => Json(UnconfirmedResponse {
            username: user.username,
            email: user.email,
            message: "You have not confirmed your account yet. \
                      Please check your inbox for the confirmation link.",
        })
        .into_response(),
        _ => Redirect::temporary("/").into_response(),
    }
}
