//! Reset Password Use Case
//!
//! Two operations: `request` issues a reset token (generic response, no
//! account disclosure), `perform` consumes it and sets the new password.
//! Like all purpose tokens, the reset token must match the still-unexpired
//! mirror on the user row in addition to carrying a valid signature.

use std::sync::Arc;

use chrono::Utc;
use platform::mail::Mailer;
use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::credentials::CredentialService;
use crate::application::token_service::{TokenPurpose, TokenService};
use crate::domain::repository::{PasswordHistoryRepository, SessionRepository, UserRepository};
use crate::domain::value_object::{email::Email, user_id::UserId};
use crate::error::{AuthError, AuthResult};

/// Reset password use case
pub struct ResetPasswordUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository + SessionRepository,
{
    repo: Arc<R>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> ResetPasswordUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository + SessionRepository,
{
    pub fn new(repo: Arc<R>, mailer: Arc<dyn Mailer>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            mailer,
            config,
        }
    }

    /// Issue a reset token and dispatch the email
    ///
    /// Always responds generically; whether the account exists is not
    /// disclosed to this unauthenticated caller.
    pub async fn request(&self, email: &str) -> AuthResult<()> {
        let Ok(email) = Email::new(email) else {
            return Ok(());
        };

        let Some(mut user) = self.repo.find_user_by_email(&email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let tokens = TokenService::new(self.config.token_secret);
        let issued = tokens.issue(&user.user_id, &user.email, TokenPurpose::Reset);
        user.set_reset_mirror(issued.token.clone(), issued.expires_at);
        self.repo.update_user(&user).await?;

        let link = format!("{}/reset-password?token={}", self.config.base_url, issued.token);
        if let Err(e) = self
            .mailer
            .send_reset_password_email(user.email.as_str(), &link, user.name.as_deref())
            .await
        {
            tracing::warn!(user_id = %user.user_id, error = %e, "Failed to dispatch reset email");
        }

        tracing::info!(user_id = %user.user_id, "Password reset requested");

        Ok(())
    }

    /// Consume a reset token and set the new password
    ///
    /// The new password is checked against the full history (fail-closed on
    /// store errors). All sessions are revoked afterwards.
    pub async fn perform(&self, token: &str, new_password: String) -> AuthResult<()> {
        let tokens = TokenService::new(self.config.token_secret);
        let claims = tokens
            .verify(token, TokenPurpose::Reset)
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let user_id = UserId::parse(&claims.user_id).ok_or(AuthError::InvalidOrExpiredToken)?;

        let mut user = self
            .repo
            .find_user_by_id(&user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        if !user.reset_mirror_matches(token, Utc::now()) {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let new_password = ClearTextPassword::new(new_password)?;

        let credentials = CredentialService::new(self.repo.clone(), self.config.clone());

        let check = credentials.check_history(&user, &new_password).await;
        if check.is_reused {
            return Err(AuthError::PasswordReused);
        }

        let new_hash = credentials.hash(&new_password)?;

        user.set_password(new_hash.clone());
        user.clear_reset_mirror();
        self.repo.update_user(&user).await?;

        credentials.record_history(&user.user_id, new_hash).await?;

        // The reset proves account control; any session minted before it is
        // suspect.
        let revoked = self.repo.delete_sessions_for_user(&user.user_id).await?;

        tracing::info!(
            user_id = %user.user_id,
            sessions_revoked = revoked,
            "Password reset completed"
        );

        Ok(())
    }
}
