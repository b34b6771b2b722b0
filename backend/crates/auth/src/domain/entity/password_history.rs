//! Password History Entity
//!
//! Append-only record of previously used password hashes, consulted to
//! forbid reuse on change/reset. Never mutated; pruning is an external
//! retention concern.

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;

use crate::domain::value_object::user_id::UserId;

/// A previously used password hash
#[derive(Debug, Clone)]
pub struct PasswordHistoryEntry {
    /// Owning user
    pub user_id: UserId,
    /// The superseded (or current) hash
    pub password_hash: HashedPassword,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl PasswordHistoryEntry {
    pub fn new(user_id: UserId, password_hash: HashedPassword) -> Self {
        Self {
            user_id,
            password_hash,
            created_at: Utc::now(),
        }
    }
}
