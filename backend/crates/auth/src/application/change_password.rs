//! Change Password Use Case
//!
//! Authenticated self-service password change. The caller already holds a
//! session, so conflict messages (wrong current password, reused password)
//! are safe to disclose.

use std::sync::Arc;

use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::credentials::CredentialService;
use crate::domain::entity::user::User;
use crate::domain::repository::{PasswordHistoryRepository, UserRepository};
use crate::error::{AuthError, AuthResult};

/// Change password use case
pub struct ChangePasswordUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository,
{
    repo: Arc<R>,
    config: Arc<AuthConfig>,
}

impl<R> ChangePasswordUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository,
{
    pub fn new(repo: Arc<R>, config: Arc<AuthConfig>) -> Self {
        Self { repo, config }
    }

    pub async fn execute(
        &self,
        user: &mut User,
        current_password: String,
        new_password: String,
    ) -> AuthResult<()> {
        let current_hash = user
            .password_hash
            .as_ref()
            .ok_or(AuthError::InvalidCredentials)?;

        let current = ClearTextPassword::new_unchecked(current_password);

        let credentials = CredentialService::new(self.repo.clone(), self.config.clone());
        if !credentials.verify(&current, current_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let new_password = ClearTextPassword::new(new_password)?;

        let check = credentials.check_history(user, &new_password).await;
        if check.is_reused {
            return Err(AuthError::PasswordReused);
        }

        let new_hash = credentials.hash(&new_password)?;

        user.set_password(new_hash.clone());
        self.repo.update_user(user).await?;

        credentials.record_history(&user.user_id, new_hash).await?;

        tracing::info!(user_id = %user.user_id, "Password changed");

        Ok(())
    }
}
