//! OAuth Sign In Use Case
//!
//! Identity resolution for authorization-code callbacks: exchange the code,
//! fetch the profile, then create or link the local account. Any missing
//! code, provider-reported error, or failed exchange short-circuits before
//! any record is written - no partial user/link state is left behind.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::application::config::{AuthConfig, OAuthProviderConfig};
use crate::application::session::SessionService;
use crate::domain::entity::{linked_account::LinkedAccount, user::User};
use crate::domain::repository::{LinkedAccountRepository, SessionRepository, UserRepository};
use crate::domain::value_object::{email::Email, user_role::UserRole};
use crate::error::{AuthError, AuthResult};

/// Profile returned by a provider after a successful exchange
#[derive(Debug, Clone)]
pub struct OAuthIdentity {
    pub provider: String,
    /// Provider-scoped account id (the `sub` claim)
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    /// Whether the provider vouches for the email address
    pub email_verified: bool,
}

/// Authorization-code exchange plus profile fetch
///
/// Faked in tests; the production implementation speaks HTTPS to the
/// provider's token and userinfo endpoints.
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    async fn authenticate(
        &self,
        provider: &str,
        config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthIdentity>;
}

/// Query parameters delivered to the callback endpoint
#[derive(Debug, Default, Clone)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// OAuth sign in use case
pub struct OAuthSignInUseCase<R>
where
    R: UserRepository + LinkedAccountRepository + SessionRepository,
{
    repo: Arc<R>,
    client: Arc<dyn IdentityProviderClient>,
    config: Arc<AuthConfig>,
}

impl<R> OAuthSignInUseCase<R>
where
    R: UserRepository + LinkedAccountRepository + SessionRepository,
{
    pub fn new(
        repo: Arc<R>,
        client: Arc<dyn IdentityProviderClient>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            repo,
            client,
            config,
        }
    }

    fn provider_config(&self, provider: &str) -> AuthResult<&OAuthProviderConfig> {
        self.config
            .oauth_providers
            .get(provider)
            .ok_or_else(|| AuthError::Provider(format!("Unknown provider: {}", provider)))
    }

    /// Build the redirect into the provider's authorization endpoint
    pub fn authorize_url(&self, provider: &str, state: &str) -> AuthResult<String> {
        let cfg = self.provider_config(provider)?;

        let url = Url::parse_with_params(
            &cfg.authorize_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", cfg.client_id.as_str()),
                ("redirect_uri", cfg.redirect_uri.as_str()),
                ("scope", cfg.scopes.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Provider(format!("Bad authorize endpoint: {}", e)))?;

        Ok(url.to_string())
    }

    /// Handle the provider callback and mint a session
    ///
    /// OAuth logins always get a persistent ("remember me") session.
    pub async fn callback(&self, provider: &str, params: CallbackParams) -> AuthResult<String> {
        let cfg = self.provider_config(provider)?;

        if let Some(error) = params.error {
            return Err(AuthError::Provider(format!(
                "Provider reported an error: {}",
                error
            )));
        }

        let code = params
            .code
            .ok_or_else(|| AuthError::Provider("Callback carried no code".to_string()))?;

        let identity = self.client.authenticate(provider, cfg, &code).await?;

        let user = self.resolve_account(identity).await?;

        let sessions = SessionService::new(self.repo.clone(), self.config.clone());
        sessions.authenticate(&user, true).await
    }

    /// Create or link the local account for a provider identity
    ///
    /// Trust decision: the provider's verified email is treated as
    /// sufficient proof of ownership, so a new OAuth identity merges into an
    /// existing account sharing that email without extra confirmation.
    async fn resolve_account(&self, identity: OAuthIdentity) -> AuthResult<User> {
        if !identity.email_verified {
            return Err(AuthError::Provider(
                "Provider did not verify the email address".to_string(),
            ));
        }

        let email = Email::new(identity.email)
            .map_err(|_| AuthError::Provider("Provider returned an invalid email".to_string()))?;

        if let Some(user) = self.repo.find_user_by_email(&email).await? {
            let existing = self
                .repo
                .find_link(&identity.provider, &identity.provider_id)
                .await?;

            if existing.is_none() {
                let link = LinkedAccount::new(
                    user.user_id.clone(),
                    identity.provider.clone(),
                    identity.provider_id.clone(),
                );
                self.repo.create_link(&link).await?;

                tracing::info!(
                    user_id = %user.user_id,
                    provider = %identity.provider,
                    "Linked new provider identity to existing account"
                );
            }

            return Ok(user);
        }

        // First sign-in for this identity: user plus first link, one logical
        // unit.
        let role = if self.config.is_privileged_email(email.as_str()) {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let user = User::new_oauth(email, identity.name.clone(), role);
        self.repo.create_user(&user).await?;

        let link = LinkedAccount::new(
            user.user_id.clone(),
            identity.provider.clone(),
            identity.provider_id.clone(),
        );
        self.repo.create_link(&link).await?;

        tracing::info!(
            user_id = %user.user_id,
            provider = %identity.provider,
            role = %role,
            "Created account from provider identity"
        );

        Ok(user)
    }
}
