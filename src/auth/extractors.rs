//! Axum extractors for the resolved principal.
//!
//! Both read the [`AuthContext`] the interceptor stored in the request
//! extensions; neither touches the database.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::context::AuthContext;
use super::errors::AuthError;
use crate::db::User;

fn context(parts: &Parts) -> AuthContext {
    parts
        .extensions
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_default()
}

/// Extractor for handlers that need a signed-in user. Rejects with 403.
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match context(parts) {
            AuthContext::User(user) => Ok(CurrentUser(user)),
            AuthContext::Anonymous => Err(AuthError::Forbidden),
        }
    }
}

/// Optional authentication extractor - never fails.
/// Useful for endpoints that work both authenticated and unauthenticated.
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match context(parts) {
            AuthContext::User(user) => Ok(MaybeUser(Some(user))),
            AuthContext::Anonymous => Ok(MaybeUser(None)),
        }
    }
}
