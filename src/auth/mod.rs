//! Session authentication and permission-gated authorization.
//!
//! The interceptor resolves the session cookie once per request into an
//! [`AuthContext`]. Extractors hand it to handlers; guards check it against a
//! [`Requirement`] before the handler runs.

mod context;
mod cookie;
mod errors;
mod extractors;
mod guard;
mod interceptor;
mod ip;

pub use context::AuthContext;
pub use cookie::{SESSION_COOKIE_NAME, clear_session_cookie, get_cookie, session_cookie};
pub use errors::AuthError;
pub use extractors::{CurrentUser, MaybeUser};
pub use guard::{Requirement, require};
pub use interceptor::{SessionState, UNCONFIRMED_PATH, intercept, is_exempt, resolve_session};
pub use ip::extract_client_ip;
