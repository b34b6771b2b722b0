//! Sign In Use Case
//!
//! First-factor authentication. When the account has a second factor
//! enabled, no session is issued; control transfers to the Two-Factor
//! Engine via a transient challenge and only a verified challenge mints the
//! session (see `two_factor_sign_in`).
//!
//! Unknown account, missing password, and wrong password are deliberately
//! indistinguishable to the caller.

use std::sync::Arc;

use platform::kv::TtlStore;
use platform::mail::Mailer;
use platform::password::ClearTextPassword;

use crate::application::config::AuthConfig;
use crate::application::credentials::CredentialService;
use crate::application::session::SessionService;
use crate::application::two_factor::{LoginChallenge, TwoFactorService};
use crate::domain::repository::{
    BackupCodeRepository, PasswordHistoryRepository, SessionRepository, UserRepository,
};
use crate::domain::value_object::email::Email;
use crate::error::{AuthError, AuthResult};

/// Sign in input
pub struct SignInInput {
    pub email: String,
    pub password: String,
    /// Remember me flag
    pub remember_me: bool,
}

/// Sign in outcome
pub enum SignInOutput {
    /// Fully authenticated; cookie material for the handler
    Session { token: String, persistent: bool },
    /// First factor passed, second factor pending
    TwoFactorRequired(LoginChallenge),
}

/// Sign in use case
pub struct SignInUseCase<R>
where
    R: UserRepository
        + SessionRepository
        + BackupCodeRepository
        + PasswordHistoryRepository,
{
    repo: Arc<R>,
    kv: Arc<dyn TtlStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> SignInUseCase<R>
where
    R: UserRepository
        + SessionRepository
        + BackupCodeRepository
        + PasswordHistoryRepository,
{
    pub fn new(
        repo: Arc<R>,
        kv: Arc<dyn TtlStore>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            repo,
            kv,
            mailer,
            config,
        }
    }

    pub async fn execute(&self, input: SignInInput) -> AuthResult<SignInOutput> {
        let email = Email::new(input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let user = self
            .repo
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // OAuth-only accounts have no password to check
        let password_hash = user
            .password_hash
            .as_ref()
            .ok_or(AuthError::InvalidCredentials)?;

        let password =
            ClearTextPassword::new(input.password).map_err(|_| AuthError::InvalidCredentials)?;

        let credentials = CredentialService::new(self.repo.clone(), self.config.clone());
        if !credentials.verify(&password, password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        if user.two_factor_enabled {
            let two_factor = TwoFactorService::new(
                self.repo.clone(),
                self.kv.clone(),
                self.mailer.clone(),
                self.config.clone(),
            );
            let challenge = two_factor.issue_login_challenge(&user).await?;
            return Ok(SignInOutput::TwoFactorRequired(challenge));
        }

        let sessions = SessionService::new(self.repo.clone(), self.config.clone());
        let token = sessions.authenticate(&user, input.remember_me).await?;

        Ok(SignInOutput::Session {
            token,
            persistent: input.remember_me,
        })
    }
}
