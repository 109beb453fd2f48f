//! Route guards.
//!
//! A guard is a middleware layer carrying a [`Requirement`]. It runs after the
//! interceptor has resolved the [`AuthContext`] and rejects the request with
//! 403 before the handler is invoked.
//!
//! ```ignore
//! Router::new()
//!     .route("/users", get(list_users))
//!     .route_layer(middleware::from_fn_with_state(
//!         Requirement::permission(Permission::ADMIN),
//!         require,
//!     ))
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::context::AuthContext;
use super::errors::AuthError;
use crate::permissions::Permission;

/// What a route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub login: bool,
    pub permissions: Permission,
}

impl Requirement {
    /// Any authenticated user.
    pub const fn login() -> Self {
        Self {
            login: true,
            permissions: Permission::NONE,
        }
    }

    /// An authenticated user holding every bit of `permissions`.
    pub const fn permission(permissions: Permission) -> Self {
        Self {
            login: true,
            permissions,
        }
    }

    pub fn allows(&self, context: &AuthContext) -> bool {
        if self.login && !context.is_authenticated() {
            return false;
        }
        context.has_permission(self.permissions)
    }
}

/// Middleware enforcing a [`Requirement`].
pub async fn require(
    State(requirement): State<Requirement>,
    request: Request,
    next: Next,
) -> Response {
    let allowed = request
        .extensions()
        .get::<AuthContext>()
        .is_some_and(|context| requirement.allows(context));

    if !allowed {
        tracing::debug!(path = %request.uri().path(), "Request rejected by route guard");
        return AuthError::Forbidden.into_response();
    }

    next.run(request).await
}
