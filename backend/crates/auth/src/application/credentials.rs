//! Credential Store
//!
//! Hashing, verification, and historical-reuse prevention for passwords.
//! The hash/verify primitives live in the platform crate; this service adds
//! the per-user history policy on top.

use std::sync::Arc;

use platform::password::{ClearTextPassword, HashedPassword};

use crate::application::config::AuthConfig;
use crate::domain::entity::{password_history::PasswordHistoryEntry, user::User};
use crate::domain::repository::PasswordHistoryRepository;
use crate::domain::value_object::user_id::UserId;
use crate::error::{AuthError, AuthResult};

/// Result of a history check
#[derive(Debug, Clone)]
pub struct HistoryCheck {
    pub is_reused: bool,
    pub message: Option<String>,
}

/// Credential handling service
pub struct CredentialService<R>
where
    R: PasswordHistoryRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> CredentialService<R>
where
    R: PasswordHistoryRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    /// Hash a password; failure is fatal to the request
    pub fn hash(&self, password: &ClearTextPassword) -> AuthResult<HashedPassword> {
        password
            .hash(self.config.pepper())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Verify a password against a stored hash
    pub fn verify(&self, password: &ClearTextPassword, hash: &HashedPassword) -> bool {
        hash.verify(password, self.config.pepper())
    }

    /// Compare a candidate against the current hash and every history entry
    ///
    /// Called before accepting a new password on change/reset, NOT on
    /// registration. Policy decision: a history-store failure fails closed -
    /// the candidate is treated as reused rather than silently allowed.
    pub async fn check_history(&self, user: &User, candidate: &ClearTextPassword) -> HistoryCheck {
        if let Some(current) = &user.password_hash {
            if self.verify(candidate, current) {
                return HistoryCheck {
                    is_reused: true,
                    message: Some("New password must differ from the current one".to_string()),
                };
            }
        }

        let history = match self.repo.history_for_user(&user.user_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(
                    user_id = %user.user_id,
                    error = %e,
                    "Password history unavailable, failing closed"
                );
                return HistoryCheck {
                    is_reused: true,
                    message: Some(
                        "Could not verify password history; try again later".to_string(),
                    ),
                };
            }
        };

        for entry in &history {
            if self.verify(candidate, &entry.password_hash) {
                return HistoryCheck {
                    is_reused: true,
                    message: Some("This password was used before".to_string()),
                };
            }
        }

        HistoryCheck {
            is_reused: false,
            message: None,
        }
    }

    /// Append a hash to the user's history; never overwrites prior entries
    pub async fn record_history(
        &self,
        user_id: &UserId,
        hash: HashedPassword,
    ) -> AuthResult<()> {
        let entry = PasswordHistoryEntry::new(user_id.clone(), hash);
        self.repo.append_history(&entry).await
    }
}
