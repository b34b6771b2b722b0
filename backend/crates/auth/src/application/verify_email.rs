//! Verify Email Use Case
//!
//! Consumes an email-verification token. Acceptance requires BOTH a valid
//! signature AND an exact match with the still-unexpired mirror on the user
//! row; consumption clears the mirror so the token is single-use.

use std::sync::Arc;

use chrono::Utc;
use platform::mail::Mailer;

use crate::application::config::AuthConfig;
use crate::application::token_service::{TokenPurpose, TokenService};
use crate::domain::repository::UserRepository;
use crate::domain::value_object::{email::Email, user_id::UserId};
use crate::error::{AuthError, AuthResult};

/// Verify email use case
pub struct VerifyEmailUseCase<R>
where
    R: UserRepository,
{
    repo: Arc<R>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> VerifyEmailUseCase<R>
where
    R: UserRepository,
{
    pub fn new(repo: Arc<R>, mailer: Arc<dyn Mailer>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            mailer,
            config,
        }
    }

    /// Consume a verification token and mark the email confirmed
    pub async fn execute(&self, token: &str) -> AuthResult<()> {
        let tokens = TokenService::new(self.config.token_secret);
        let claims = tokens
            .verify(token, TokenPurpose::Verification)
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        let user_id = UserId::parse(&claims.user_id).ok_or(AuthError::InvalidOrExpiredToken)?;

        let mut user = self
            .repo
            .find_user_by_id(&user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredToken)?;

        // Signature alone is not enough: the mirror must still hold this
        // exact token. A cleared mirror means the token was already used or
        // revoked.
        if !user.verification_mirror_matches(token, Utc::now()) {
            return Err(AuthError::InvalidOrExpiredToken);
        }

        user.mark_email_verified();
        user.clear_verification_mirror();
        self.repo.update_user(&user).await?;

        if let Err(e) = self
            .mailer
            .send_welcome_email(user.email.as_str(), user.name.as_deref())
            .await
        {
            tracing::warn!(user_id = %user.user_id, error = %e, "Failed to dispatch welcome email");
        }

        tracing::info!(user_id = %user.user_id, "Email verified");

        Ok(())
    }

    /// Re-issue the verification token for a not-yet-verified account
    ///
    /// Responds generically regardless of whether the email exists; this is
    /// an unauthenticated endpoint.
    pub async fn resend(&self, email: &str) -> AuthResult<()> {
        let Ok(email) = Email::new(email) else {
            return Ok(());
        };

        let Some(mut user) = self.repo.find_user_by_email(&email).await? else {
            tracing::debug!("Resend verification for unknown email");
            return Ok(());
        };

        if user.email_verified {
            return Ok(());
        }

        let tokens = TokenService::new(self.config.token_secret);
        let issued = tokens.issue(&user.user_id, &user.email, TokenPurpose::Verification);
        user.set_verification_mirror(issued.token.clone(), issued.expires_at);
        self.repo.update_user(&user).await?;

        let link = format!("{}/verify-email?token={}", self.config.base_url, issued.token);
        if let Err(e) = self
            .mailer
            .send_verification_email(user.email.as_str(), &link, user.name.as_deref())
            .await
        {
            tracing::warn!(user_id = %user.user_id, error = %e, "Failed to dispatch verification email");
        }

        tracing::info!(user_id = %user.user_id, "Verification email re-issued");

        Ok(())
    }
}
