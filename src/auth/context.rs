//! The resolved principal for a request.

use crate::db::User;
use crate::permissions::Permission;

/// Who is making the current request. Inserted into request extensions by
/// the interceptor and read by extractors and guards.
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    #[default]
    Anonymous,
    User(User),
}

impl AuthContext {
    pub fn user(&self) -> Option<&User> {
        match self {
            AuthContext::Anonymous => None,
            AuthContext::User(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthContext::User(_))
    }

    /// The principal's permission mask. Anonymous visitors hold none.
    pub fn permissions(&self) -> Permission {
        self.user()
            .map(|user| user.role.permissions)
            .unwrap_or(Permission::NONE)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(permission)
    }

    /// Administrators are whoever holds the ADMIN bit; there is no separate flag.
    pub fn is_admin(&self) -> bool {
        self.has_permission(Permission::ADMIN)
    }
}
