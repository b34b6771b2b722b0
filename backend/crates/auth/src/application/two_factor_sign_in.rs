//! Two-Factor Sign In Use Case
//!
//! Second step of a 2FA login: consume the pending challenge, verify the
//! supplied code (method-specific check first, backup code as fallback),
//! and only then mint the session.

use std::sync::Arc;

use platform::kv::TtlStore;
use platform::mail::Mailer;

use crate::application::config::AuthConfig;
use crate::application::session::SessionService;
use crate::application::two_factor::TwoFactorService;
use crate::domain::repository::{BackupCodeRepository, SessionRepository, UserRepository};
use crate::error::AuthResult;

/// Two-factor sign in input
pub struct TwoFactorSignInInput {
    pub challenge_id: String,
    pub code: String,
    pub remember_me: bool,
}

/// Two-factor sign in output
pub struct TwoFactorSignInOutput {
    pub token: String,
    pub persistent: bool,
}

/// Two-factor sign in use case
pub struct TwoFactorSignInUseCase<R>
where
    R: UserRepository + SessionRepository + BackupCodeRepository,
{
    repo: Arc<R>,
    kv: Arc<dyn TtlStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> TwoFactorSignInUseCase<R>
where
    R: UserRepository + SessionRepository + BackupCodeRepository,
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

    pub async fn execute(&self, input: TwoFactorSignInInput) -> AuthResult<TwoFactorSignInOutput> {
        let two_factor = TwoFactorService::new(
            self.repo.clone(),
            self.kv.clone(),
            self.mailer.clone(),
            self.config.clone(),
        );

        let user = two_factor
            .verify_login_challenge(&input.challenge_id, &input.code)
            .await?;

        let sessions = SessionService::new(self.repo.clone(), self.config.clone());
        let token = sessions.authenticate(&user, input.remember_me).await?;

        Ok(TwoFactorSignInOutput {
            token,
            persistent: input.remember_me,
        })
    }
}
