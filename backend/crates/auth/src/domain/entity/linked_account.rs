//! Linked Account Entity
//!
//! Association between a local user and an external identity provider.
//! A (provider, provider_id) pair maps to at most one user.

use chrono::{DateTime, Utc};

use crate::domain::value_object::user_id::UserId;

/// External identity link
#[derive(Debug, Clone)]
pub struct LinkedAccount {
    /// Owning user
    pub user_id: UserId,
    /// Provider name ("google", "github", ...)
    pub provider: String,
    /// Provider-scoped account id (the `sub` claim)
    pub provider_id: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl LinkedAccount {
    pub fn new(user_id: UserId, provider: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            user_id,
            provider: provider.into(),
            provider_id: provider_id.into(),
            created_at: Utc::now(),
        }
    }
}
