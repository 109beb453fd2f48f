//! Per-request session resolution.
//!
//! Runs before routing for every request: resolves the session cookie into an
//! [`AuthContext`], records activity for signed-in users, and keeps
//! unconfirmed accounts inside the confirmation flow.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::context::AuthContext;
use super::cookie::{SESSION_COOKIE_NAME, get_cookie};
use crate::db::Database;
use crate::tokens::TokenConfig;

/// Where unconfirmed users are sent.
pub const UNCONFIRMED_PATH: &str = "/unconfirmed";

/// Paths an unconfirmed user may still reach.
const CONFIRMATION_FLOW: [&str; 4] = ["/login", "/register", "/logout", UNCONFIRMED_PATH];
const CONFIRM_PREFIX: &str = "/confirm/";
const STATIC_PREFIX: &str = "/static/";

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub tokens: Arc<TokenConfig>,
}

/// Whether `path` belongs to the confirmation flow or the public assets.
pub fn is_exempt(path: &str) -> bool {
    CONFIRMATION_FLOW.contains(&path)
        || path.starts_with(CONFIRM_PREFIX)
        || path.starts_with(STATIC_PREFIX)
}

/// Resolve the session cookie. Anything short of a valid token naming an
/// existing user is anonymous.
pub async fn resolve_session(state: &SessionState, headers: &HeaderMap) -> AuthContext {
    let Some(token) = get_cookie(headers, SESSION_COOKIE_NAME) else {
        return AuthContext::Anonymous;
    };

    let claims = match state.tokens.validate_session(token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "Ignoring session cookie");
            return AuthContext::Anonymous;
        }
    };

    match state.db.users().find_by_id(claims.sub).await {
        Ok(Some(user)) => AuthContext::User(user),
        Ok(None) => {
            debug!(user_id = claims.sub, "Session names a missing user");
            AuthContext::Anonymous
        }
        Err(e) => {
            error!(user_id = claims.sub, error = %e, "Failed to load session user");
            AuthContext::Anonymous
        }
    }
}

/// Middleware applied to the whole application.
pub async fn intercept(
    State(state): State<SessionState>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut context = resolve_session(&state, request.headers()).await;

    if let AuthContext::User(user) = &mut context {
        // Ping before deciding on the redirect so blocked attempts count as activity.
        match state.db.users().ping(user.id).await {
            Ok(Some(last_seen)) => user.last_seen = last_seen,
            Ok(None) => {}
            Err(e) => warn!(user_id = user.id, error = %e, "Failed to update last seen"),
        }

        let path = request.uri().path();
        if !user.confirmed && !is_exempt(path) {
            debug!(user_id = user.id, path = %path, "Redirecting unconfirmed user");
            return Redirect::temporary(UNCONFIRMED_PATH).into_response();
        }
    }

    request.extensions_mut().insert(context);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_flow_is_exempt() {
        assert!(is_exempt("/login"));
        assert!(is_exempt("/register"));
        assert!(is_exempt("/logout"));
        assert!(is_exempt("/unconfirmed"));
        assert!(is_exempt("/confirm/abc.def.ghi"));
        assert!(is_exempt("/static/style.css"));
    }

    #[test]
    fn test_protected_paths_not_exempt() {
        assert!(!is_exempt("/"));
        assert!(!is_exempt("/secret"));
        assert!(!is_exempt("/me"));
        assert!(!is_exempt("/admin/users"));
        assert!(!is_exempt("/confirm"));
        assert!(!is_exempt("/loginx"));
        assert!(!is_exempt("/static"));
    }

    #[tokio::test]
    async fn test_resolve_session() {
        use crate::db::NewUser;

        let db = Database::open(":memory:").await.unwrap();
        let tokens = Arc::new(TokenConfig::new(b"test-secret"));
        let state = SessionState {
            db: db.clone(),
            tokens: tokens.clone(),
        };

        let role = db.roles().default_role().await.unwrap().unwrap();
        let id = db
            .users()
            .insert(&NewUser {
                email: "alice@example.com",
                username: "alice",
                password_hash: "x",
                role_id: role.id,
            })
            .await
            .unwrap();

        let mut headers = HeaderMap::new();
        assert!(!resolve_session(&state, &headers).await.is_authenticated());

        let session = tokens.issue_session(id, false).unwrap();
        headers.insert(
            axum::http::header::COOKIE,
            format!("session={}", session.token).parse().unwrap(),
        );
        let context = resolve_session(&state, &headers).await;
        assert_eq!(context.user().map(|u| u.id), Some(id));

        let stranger = tokens.issue_session(id + 100, false).unwrap();
        headers.insert(
            axum::http::header::COOKIE,
            format!("session={}", stranger.token).parse().unwrap(),
        );
        assert!(!resolve_session(&state, &headers).await.is_authenticated());

        headers.insert(
            axum::http::header::COOKIE,
            "session=garbage".parse().unwrap(),
        );
        assert!(!resolve_session(&state, &headers).await.is_authenticated());
    }
}
