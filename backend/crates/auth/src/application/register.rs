//! Register Use Case
//!
//! Creates a new password-based account. No session is issued; the response
//! tells the caller that email verification is pending.

use std::sync::Arc;

use platform::mail::Mailer;
use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::credentials::CredentialService;
use crate::application::token_service::{TokenPurpose, TokenService};
use crate::domain::entity::user::User;
use crate::domain::repository::{PasswordHistoryRepository, UserRepository};
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Register input
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Register output
pub struct RegisterOutput {
    pub user_id: String,
    /// Always true: a fresh account must confirm its email
    pub verification_required: bool,
}

/// Register use case
pub struct RegisterUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository,
{
    repo: Arc<R>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> RegisterUseCase<R>
where
    R: UserRepository + PasswordHistoryRepository,
{
    pub fn new(repo: Arc<R>, mailer: Arc<dyn Mailer>, config: Arc<AuthConfig>) -> Self {
        Self {
            repo,
            mailer,
            config,
        }
    }

    pub async fn execute(&self, input: RegisterInput) -> AuthResult<RegisterOutput> {
        let email = Email::new(input.email)?;
        let password = ClearTextPassword::new(input.password)?;

        if self.repo.exists_by_email(&email).await? {
            return Err(AuthError::EmailTaken);
        }

        let credentials = CredentialService::new(self.repo.clone(), self.config.clone());
        let password_hash = credentials.hash(&password)?;

        let mut user = User::new(email.clone(), input.name, password_hash.clone());

        // Verification token plus its server-side mirror; the mirror is what
        // makes the token single-use.
        let tokens = TokenService::new(self.config.token_secret);
        let issued = tokens.issue(&user.user_id, &email, TokenPurpose::Verification);
        user.set_verification_mirror(issued.token.clone(), issued.expires_at);

        self.repo.create_user(&user).await?;

        // History starts at registration so the first change already has a
        // baseline to compare against.
        credentials.record_history(&user.user_id, password_hash).await?;

        // Fire-and-forget: a failed dispatch leaves the account in a
        // recoverable state (resend-verification), never rolls it back.
        let link = format!("{}/verify-email?token={}", self.config.base_url, issued.token);
        if let Err(e) = self
            .mailer
            .send_verification_email(email.as_str(), &link, user.name.as_deref())
            .await
        {
            tracing::warn!(user_id = %user.user_id, error = %e, "Failed to dispatch verification email");
        }

        tracing::info!(user_id = %user.user_id, "User registered");

        Ok(RegisterOutput {
            user_id: user.user_id.to_string(),
            verification_required: true,
        })
    }
}
