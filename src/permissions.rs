//! Permission bits carried by roles.
//!
//! A role's mask is the union of the capabilities it grants. Authorization
//! checks never look at role names, only at bits.

use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// A set of grantable capabilities stored as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    /// No capabilities. Anonymous visitors hold exactly this.
    pub const NONE: Permission = Permission(0);
    /// Write reviews and ratings.
    pub const REVIEW: Permission = Permission(0x01);
    /// Publish recipes.
    pub const PUBLISH: Permission = Permission(0x02);
    /// Attach images to recipes.
    pub const UPLOAD: Permission = Permission(0x04);
    /// Moderate other users' content.
    pub const MODERATE: Permission = Permission(0x08);
    /// Administer the site.
    pub const ADMIN: Permission = Permission(0x10);
    /// Every bit set, including ones not yet assigned a meaning.
    pub const ALL: Permission = Permission(u32::MAX);

    const NAMED: [(Permission, &'static str); 5] = [
        (Permission::REVIEW, "review"),
        (Permission::PUBLISH, "publish"),
        (Permission::UPLOAD, "upload"),
        (Permission::MODERATE, "moderate"),
        (Permission::ADMIN, "admin"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Permission(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Permission) -> Permission {
        Permission(self.0 | other.0)
    }

    /// True iff every bit of `required` is present in `self`.
    pub const fn contains(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Names of the known capabilities present in this mask.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(permission, _)| self.contains(*permission))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        self.union(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_requires_every_bit() {
        let mask = Permission::REVIEW | Permission::PUBLISH;
        assert!(mask.contains(Permission::REVIEW));
        assert!(mask.contains(Permission::REVIEW | Permission::PUBLISH));
        assert!(!mask.contains(Permission::REVIEW | Permission::MODERATE));
        assert!(!mask.contains(Permission::ADMIN));
    }

    #[test]
    fn test_empty_requirement_always_satisfied() {
        assert!(Permission::NONE.contains(Permission::NONE));
        assert!(Permission::ALL.contains(Permission::NONE));
    }

    #[test]
    fn test_none_holds_no_bit() {
        for shift in 0..32 {
            assert!(!Permission::NONE.contains(Permission::from_bits(1 << shift)));
        }
    }

    #[test]
    fn test_all_holds_every_bit() {
        for shift in 0..32 {
            assert!(Permission::ALL.contains(Permission::from_bits(1 << shift)));
        }
    }

    #[test]
    fn test_names() {
        let mask = Permission::REVIEW | Permission::MODERATE;
        assert_eq!(mask.names(), vec!["review", "moderate"]);
        assert!(Permission::NONE.names().is_empty());
        assert_eq!(Permission::ALL.names().len(), 5);
    }
}
