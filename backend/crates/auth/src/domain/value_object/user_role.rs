//! User Role Value Object
//!
//! Ordinary users and administrators. OAuth sign-ups derive the role from a
//! configured allow-list of privileged emails.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(i16)]
pub enum UserRole {
    #[default]
    User = 0,
    Admin = 1,
}

impl UserRole {
    #[inline]
    pub const fn id(&self) -> i16 {
        *self as i16
    }

    #[inline]
    pub const fn code(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    #[inline]
    pub const fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    /// Map a database id back to a role; unknown values degrade to `User`
    #[inline]
    pub fn from_id(id: i16) -> Self {
        match id {
            0 => UserRole::User,
            1 => UserRole::Admin,
            _ => {
                tracing::error!(id, "Unknown UserRole id, defaulting to user");
                UserRole::User
            }
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ids_roundtrip() {
        assert_eq!(UserRole::from_id(UserRole::User.id()), UserRole::User);
        assert_eq!(UserRole::from_id(UserRole::Admin.id()), UserRole::Admin);
    }

    #[test]
    fn test_unknown_id_degrades_to_user() {
        assert_eq!(UserRole::from_id(99), UserRole::User);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(UserRole::User.to_string(), "user");
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::User.is_admin());
    }
}
