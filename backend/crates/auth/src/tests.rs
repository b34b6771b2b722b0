//! Scenario tests for the auth core
//!
//! Exercise the use cases end to end against the in-memory repository, the
//! in-process TTL store, a recording mailer, and a fake identity provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use platform::kv::{MemoryTtlStore, TtlStore};
use platform::mail::{MailError, Mailer};

use crate::application::config::OAuthProviderConfig;
use crate::application::oauth::{
    CallbackParams, IdentityProviderClient, OAuthIdentity, OAuthSignInUseCase,
};
use crate::application::{
    AuthConfig, ChangePasswordUseCase, RegisterInput, RegisterUseCase, ResetPasswordUseCase,
    SessionService, SignInInput, SignInOutput, SignInUseCase, TwoFactorProof, TwoFactorService,
    TwoFactorSetup, TwoFactorSignInInput, TwoFactorSignInUseCase, VerifyEmailUseCase,
};
use crate::domain::entity::user::User;
use crate::domain::value_object::two_factor::{TotpSecret, TwoFactorMethod};
use crate::error::AuthError;
use crate::infra::memory::MemoryAuthRepository;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Clone)]
struct SentMail {
    kind: &'static str,
    to: String,
    /// Link or code, depending on the mail kind
    payload: String,
}

/// Mailer that records every dispatch instead of sending
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    fn record(&self, kind: &'static str, to: &str, payload: &str) {
        self.sent.lock().unwrap().push(SentMail {
            kind,
            to: to.to_string(),
            payload: payload.to_string(),
        });
    }

    fn payloads(&self, kind: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.payload.clone())
            .collect()
    }

    fn last_payload(&self, kind: &str) -> Option<String> {
        self.payloads(kind).pop()
    }

    fn count_to(&self, kind: &str, to: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.kind == kind && m.to == to)
            .count()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        link: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        self.record("verification", to, link);
        Ok(())
    }

    async fn send_reset_password_email(
        &self,
        to: &str,
        link: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        self.record("reset", to, link);
        Ok(())
    }

    async fn send_two_factor_code_email(
        &self,
        to: &str,
        code: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        self.record("2fa", to, code);
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, _name: Option<&str>) -> Result<(), MailError> {
        self.record("welcome", to, "");
        Ok(())
    }
}

/// Identity provider that returns a canned identity for any code
struct FakeProvider {
    identity: OAuthIdentity,
}

#[async_trait]
impl IdentityProviderClient for FakeProvider {
    async fn authenticate(
        &self,
        _provider: &str,
        _config: &OAuthProviderConfig,
        _code: &str,
    ) -> crate::error::AuthResult<OAuthIdentity> {
        Ok(self.identity.clone())
    }
}

// ============================================================================
// Environment
// ============================================================================

struct Env {
    repo: Arc<MemoryAuthRepository>,
    kv: Arc<MemoryTtlStore>,
    mailer: Arc<RecordingMailer>,
    config: Arc<AuthConfig>,
}

impl Env {
    fn new() -> Self {
        let mut config = AuthConfig::development();
        config.base_url = "https://test.example".to_string();
        config.privileged_emails = vec!["boss@x.com".to_string()];
        config.oauth_providers.insert(
            "google".to_string(),
            OAuthProviderConfig {
                authorize_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo"
                    .to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://test.example/api/auth/oauth/google/callback".to_string(),
                scopes: "openid email profile".to_string(),
            },
        );

        Self {
            repo: Arc::new(MemoryAuthRepository::new()),
            kv: Arc::new(MemoryTtlStore::new()),
            mailer: Arc::new(RecordingMailer::default()),
            config: Arc::new(config),
        }
    }

    fn kv_dyn(&self) -> Arc<dyn TtlStore> {
        self.kv.clone()
    }

    fn mailer_dyn(&self) -> Arc<dyn Mailer> {
        self.mailer.clone()
    }

    fn register_use_case(&self) -> RegisterUseCase<MemoryAuthRepository> {
        RegisterUseCase::new(self.repo.clone(), self.mailer_dyn(), self.config.clone())
    }

    fn verify_email_use_case(&self) -> VerifyEmailUseCase<MemoryAuthRepository> {
        VerifyEmailUseCase::new(self.repo.clone(), self.mailer_dyn(), self.config.clone())
    }

    fn sign_in_use_case(&self) -> SignInUseCase<MemoryAuthRepository> {
        SignInUseCase::new(
            self.repo.clone(),
            self.kv_dyn(),
            self.mailer_dyn(),
            self.config.clone(),
        )
    }

    fn two_factor_service(&self) -> TwoFactorService<MemoryAuthRepository> {
        TwoFactorService::new(
            self.repo.clone(),
            self.kv_dyn(),
            self.mailer_dyn(),
            self.config.clone(),
        )
    }

    fn session_service(&self) -> SessionService<MemoryAuthRepository> {
        SessionService::new(self.repo.clone(), self.config.clone())
    }

    fn reset_use_case(&self) -> ResetPasswordUseCase<MemoryAuthRepository> {
        ResetPasswordUseCase::new(self.repo.clone(), self.mailer_dyn(), self.config.clone())
    }

    fn oauth_use_case(&self, identity: OAuthIdentity) -> OAuthSignInUseCase<MemoryAuthRepository> {
        OAuthSignInUseCase::new(
            self.repo.clone(),
            Arc::new(FakeProvider { identity }),
            self.config.clone(),
        )
    }

    /// Register and return the stored user
    async fn register(&self, email: &str, password: &str) -> User {
        self.register_use_case()
            .execute(RegisterInput {
                email: email.to_string(),
                password: password.to_string(),
                name: None,
            })
            .await
            .unwrap();
        self.user_by_email(email).await
    }

    /// Register and complete email verification
    async fn register_verified(&self, email: &str, password: &str) -> User {
        self.register(email, password).await;
        let token = self.token_from_link(&self.mailer.last_payload("verification").unwrap());
        self.verify_email_use_case().execute(&token).await.unwrap();
        self.user_by_email(email).await
    }

    async fn user_by_email(&self, email: &str) -> User {
        use crate::domain::repository::UserRepository;
        self.repo
            .find_user_by_email(&crate::domain::value_object::email::Email::new(email).unwrap())
            .await
            .unwrap()
            .expect("user exists")
    }

    fn token_from_link(&self, link: &str) -> String {
        link.split_once("token=").expect("link carries token").1.to_string()
    }

    /// Enable TOTP for the user; returns the base32 secret and backup codes
    async fn enable_totp(&self, email: &str) -> (String, Vec<String>) {
        let mut user = self.user_by_email(email).await;
        let service = self.two_factor_service();

        let TwoFactorSetup::Totp { secret, .. } =
            service.initiate(&user, TwoFactorMethod::Totp).await.unwrap()
        else {
            panic!("expected totp setup material");
        };

        let code = TotpSecret::from_base32(secret.clone())
            .unwrap()
            .generate_current(email)
            .unwrap();

        let backup_codes = service
            .complete(
                &mut user,
                TwoFactorProof::Totp {
                    secret: secret.clone(),
                    code,
                },
            )
            .await
            .unwrap();

        (secret, backup_codes)
    }
}

const PASSWORD: &str = "P@ssw0rd1!unique";

// ============================================================================
// Registration & email verification
// ============================================================================

mod registration_tests {
    use super::*;

    #[tokio::test]
    async fn register_requires_verification_and_issues_no_session() {
        let env = Env::new();

        let output = env
            .register_use_case()
            .execute(RegisterInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                name: Some("A".to_string()),
            })
            .await
            .unwrap();

        assert!(output.verification_required);

        let user = env.user_by_email("a@x.com").await;
        assert!(!user.email_verified);
        assert!(user.verification_token.is_some());

        // Verification email went out with a token link
        let link = env.mailer.last_payload("verification").unwrap();
        assert!(link.contains("token="));

        // No session exists for anyone
        assert!(
            env.session_service()
                .current_user("not-a-token")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let env = Env::new();
        env.register("a@x.com", PASSWORD).await;

        let result = env
            .register_use_case()
            .execute(RegisterInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                name: None,
            })
            .await;

        assert!(matches!(result, Err(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn verification_token_is_single_use() {
        let env = Env::new();
        env.register("a@x.com", PASSWORD).await;

        let token = env.token_from_link(&env.mailer.last_payload("verification").unwrap());

        env.verify_email_use_case().execute(&token).await.unwrap();
        assert!(env.user_by_email("a@x.com").await.email_verified);
        assert_eq!(env.mailer.count_to("welcome", "a@x.com"), 1);

        // Signature is still valid, but the mirror is cleared
        let result = env.verify_email_use_case().execute(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn reissue_revokes_the_previous_token() {
        let env = Env::new();
        env.register("a@x.com", PASSWORD).await;

        let first = env.token_from_link(&env.mailer.last_payload("verification").unwrap());

        env.verify_email_use_case().resend("a@x.com").await.unwrap();
        let second = env.token_from_link(&env.mailer.last_payload("verification").unwrap());
        assert_ne!(first, second);

        // The old token no longer matches the mirror
        let result = env.verify_email_use_case().execute(&first).await;
        assert!(matches!(result, Err(AuthError::InvalidOrExpiredToken)));

        env.verify_email_use_case().execute(&second).await.unwrap();
    }

    #[tokio::test]
    async fn resend_is_generic_for_unknown_accounts() {
        let env = Env::new();
        // Unknown email: still Ok, nothing dispatched
        env.verify_email_use_case()
            .resend("ghost@x.com")
            .await
            .unwrap();
        assert_eq!(env.mailer.count_to("verification", "ghost@x.com"), 0);
    }
}

// ============================================================================
// Sign in & sessions
// ============================================================================

mod sign_in_tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trip_resolves_the_same_user() {
        let env = Env::new();
        let registered = env.register_verified("a@x.com", PASSWORD).await;

        let output = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: false,
            })
            .await
            .unwrap();

        let SignInOutput::Session { token, persistent } = output else {
            panic!("expected a session");
        };
        assert!(!persistent);

        let resolved = env
            .session_service()
            .current_user(&token)
            .await
            .unwrap()
            .expect("session resolves");
        assert_eq!(resolved.user_id, registered.user_id);
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;

        let unknown = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "ghost@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: false,
            })
            .await;

        let wrong = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: "Wr0ng-password!".to_string(),
                remember_me: false,
            })
            .await;

        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn cookie_round_trip_resolves_the_same_user() {
        let env = Env::new();
        let registered = env.register_verified("a@x.com", PASSWORD).await;

        let SignInOutput::Session { token, persistent } = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: true,
            })
            .await
            .unwrap()
        else {
            panic!("expected a session");
        };

        // What the handler would send
        let max_age = persistent.then(|| env.config.session_ttl_persistent.as_secs());
        let set_cookie = env.config.cookie_config().build_set_cookie(&token, max_age);
        assert!(set_cookie.contains("Max-Age="));

        // What the next request would carry
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, pair.parse().unwrap());

        let extracted =
            platform::cookie::extract_cookie(&headers, &env.config.session_cookie_name)
                .expect("cookie survives the round trip");

        let resolved = env
            .session_service()
            .current_user(&extracted)
            .await
            .unwrap()
            .expect("session resolves");
        assert_eq!(resolved.user_id, registered.user_id);
    }

    #[tokio::test]
    async fn destroyed_session_stops_resolving_before_expiry() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;

        let SignInOutput::Session { token, .. } = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: true,
            })
            .await
            .unwrap()
        else {
            panic!("expected a session");
        };

        let sessions = env.session_service();
        assert!(sessions.current_user(&token).await.unwrap().is_some());

        sessions.destroy(&token).await.unwrap();

        // Signature is still cryptographically valid; the mirror is gone
        assert!(sessions.current_user(&token).await.unwrap().is_none());
    }
}

// ============================================================================
// Two-factor authentication
// ============================================================================

mod two_factor_tests {
    use super::*;

    #[tokio::test]
    async fn totp_setup_persists_nothing_until_completed() {
        let env = Env::new();
        let user = env.register_verified("a@x.com", PASSWORD).await;

        let service = env.two_factor_service();
        service.initiate(&user, TwoFactorMethod::Totp).await.unwrap();

        let after = env.user_by_email("a@x.com").await;
        assert!(!after.two_factor_enabled);
        assert!(after.totp_secret.is_none());
        assert_eq!(env.repo.unused_code_count(&after.user_id), 0);
    }

    #[tokio::test]
    async fn enabled_totp_forces_a_second_factor_at_login() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let (secret, _) = env.enable_totp("a@x.com").await;

        let user = env.user_by_email("a@x.com").await;
        assert!(user.two_factor_enabled);
        assert_eq!(user.two_factor_method, Some(TwoFactorMethod::Totp));

        // Correct password alone no longer yields a session
        let output = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: true,
            })
            .await
            .unwrap();

        let SignInOutput::TwoFactorRequired(challenge) = output else {
            panic!("expected a two-factor challenge");
        };
        assert_eq!(challenge.method, TwoFactorMethod::Totp);

        // The current TOTP code completes the login
        let code = TotpSecret::from_base32(secret)
            .unwrap()
            .generate_current("a@x.com")
            .unwrap();

        let signed_in = TwoFactorSignInUseCase::new(
            env.repo.clone(),
            env.kv_dyn(),
            env.mailer_dyn(),
            env.config.clone(),
        )
        .execute(TwoFactorSignInInput {
            challenge_id: challenge.challenge_id,
            code,
            remember_me: true,
        })
        .await
        .unwrap();
        assert!(signed_in.persistent);

        assert!(
            env.session_service()
                .current_user(&signed_in.token)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn wrong_totp_secret_cannot_complete_setup() {
        let env = Env::new();
        let mut user = env.register_verified("a@x.com", PASSWORD).await;

        let service = env.two_factor_service();
        service.initiate(&user, TwoFactorMethod::Totp).await.unwrap();

        // Code from a different secret
        let other = TotpSecret::generate();
        let code = other.generate_current("a@x.com").unwrap();

        let result = service
            .complete(
                &mut user,
                TwoFactorProof::Totp {
                    secret: TotpSecret::generate().as_base32().to_string(),
                    code,
                },
            )
            .await;

        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
        assert!(!env.user_by_email("a@x.com").await.two_factor_enabled);
    }

    #[tokio::test]
    async fn login_challenge_is_single_use() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let (secret, _) = env.enable_totp("a@x.com").await;

        let user = env.user_by_email("a@x.com").await;
        let service = env.two_factor_service();
        let challenge = service.issue_login_challenge(&user).await.unwrap();

        // First attempt consumes the challenge even though the code is wrong
        let wrong = service
            .verify_login_challenge(&challenge.challenge_id, "000000")
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidTwoFactorCode)));

        // A correct code on the same challenge id now fails: replay is dead
        let code = TotpSecret::from_base32(secret)
            .unwrap()
            .generate_current("a@x.com")
            .unwrap();
        let replay = service
            .verify_login_challenge(&challenge.challenge_id, &code)
            .await;
        assert!(matches!(replay, Err(AuthError::InvalidTwoFactorCode)));
    }

    #[tokio::test]
    async fn backup_code_verifies_exactly_once() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let (_, backup_codes) = env.enable_totp("a@x.com").await;

        let user = env.user_by_email("a@x.com").await;
        let service = env.two_factor_service();

        // Lowercased input still matches (comparison is uppercased)
        let code = backup_codes[0].to_lowercase();

        let challenge = service.issue_login_challenge(&user).await.unwrap();
        service
            .verify_login_challenge(&challenge.challenge_id, &code)
            .await
            .unwrap();

        // Same code on a fresh challenge must fail
        let challenge = service.issue_login_challenge(&user).await.unwrap();
        let result = service
            .verify_login_challenge(&challenge.challenge_id, &code)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
    }

    #[tokio::test]
    async fn regeneration_invalidates_the_previous_batch() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let (_, first_batch) = env.enable_totp("a@x.com").await;

        let user = env.user_by_email("a@x.com").await;
        let service = env.two_factor_service();

        let second_batch = service.regenerate_backup_codes(&user).await.unwrap();
        assert_eq!(second_batch.len(), env.config.backup_code_count);

        // Only the second batch ever verifies
        let challenge = service.issue_login_challenge(&user).await.unwrap();
        let old = service
            .verify_login_challenge(&challenge.challenge_id, &first_batch[0])
            .await;
        assert!(matches!(old, Err(AuthError::InvalidTwoFactorCode)));

        let challenge = service.issue_login_challenge(&user).await.unwrap();
        service
            .verify_login_challenge(&challenge.challenge_id, &second_batch[0])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn email_method_round_trip() {
        let env = Env::new();
        let mut user = env.register_verified("a@x.com", PASSWORD).await;

        let service = env.two_factor_service();

        // Setup: code goes out by mail, completing with it enables the method
        service.initiate(&user, TwoFactorMethod::Email).await.unwrap();
        let setup_code = env.mailer.last_payload("2fa").unwrap();
        service
            .complete(&mut user, TwoFactorProof::Email { code: setup_code })
            .await
            .unwrap();
        assert_eq!(
            env.user_by_email("a@x.com").await.two_factor_method,
            Some(TwoFactorMethod::Email)
        );

        // Login: challenge issuance dispatches a fresh code
        let user = env.user_by_email("a@x.com").await;
        let challenge = service.issue_login_challenge(&user).await.unwrap();
        assert_eq!(challenge.method, TwoFactorMethod::Email);

        let login_code = env.mailer.last_payload("2fa").unwrap();
        let resolved = service
            .verify_login_challenge(&challenge.challenge_id, &login_code)
            .await
            .unwrap();
        assert_eq!(resolved.user_id, user.user_id);

        // The code was invalidated on success
        let challenge = service.issue_login_challenge(&user).await.unwrap();
        // (a new code went out; the consumed one must not pass)
        let result = service
            .verify_login_challenge(&challenge.challenge_id, "999999")
            .await;
        assert!(matches!(result, Err(AuthError::InvalidTwoFactorCode)));
    }

    #[tokio::test]
    async fn disable_clears_method_secret_and_codes() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        env.enable_totp("a@x.com").await;

        let mut user = env.user_by_email("a@x.com").await;
        assert!(env.repo.unused_code_count(&user.user_id) > 0);

        let service = env.two_factor_service();
        service.disable(&mut user).await.unwrap();

        let after = env.user_by_email("a@x.com").await;
        assert!(!after.two_factor_enabled);
        assert!(after.two_factor_method.is_none());
        assert!(after.totp_secret.is_none());
        assert_eq!(env.repo.unused_code_count(&after.user_id), 0);

        // Password alone signs in again
        let output = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: false,
            })
            .await
            .unwrap();
        assert!(matches!(output, SignInOutput::Session { .. }));
    }
}

// ============================================================================
// Password lifecycle
// ============================================================================

mod password_tests {
    use super::*;

    #[tokio::test]
    async fn reset_flow_replaces_password_and_revokes_sessions() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;

        // An existing session that must die with the reset
        let SignInOutput::Session { token, .. } = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: true,
            })
            .await
            .unwrap()
        else {
            panic!("expected a session");
        };

        env.reset_use_case().request("a@x.com").await.unwrap();
        let reset_token = env.token_from_link(&env.mailer.last_payload("reset").unwrap());

        let new_password = "N3w-P@ssword-42!";
        env.reset_use_case()
            .perform(&reset_token, new_password.to_string())
            .await
            .unwrap();

        // Old password dead, new one works
        let old = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: PASSWORD.to_string(),
                remember_me: false,
            })
            .await;
        assert!(matches!(old, Err(AuthError::InvalidCredentials)));

        let new = env
            .sign_in_use_case()
            .execute(SignInInput {
                email: "a@x.com".to_string(),
                password: new_password.to_string(),
                remember_me: false,
            })
            .await
            .unwrap();
        assert!(matches!(new, SignInOutput::Session { .. }));

        // Pre-reset session was revoked server-side
        assert!(
            env.session_service()
                .current_user(&token)
                .await
                .unwrap()
                .is_none()
        );

        // The reset token was consumed with the mirror
        let replay = env
            .reset_use_case()
            .perform(&reset_token, "Another-P@ss-43!".to_string())
            .await;
        assert!(matches!(replay, Err(AuthError::InvalidOrExpiredToken)));
    }

    #[tokio::test]
    async fn reset_rejects_a_previously_used_password() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;

        env.reset_use_case().request("a@x.com").await.unwrap();
        let token = env.token_from_link(&env.mailer.last_payload("reset").unwrap());

        // Registration already recorded this hash in the history
        let result = env.reset_use_case().perform(&token, PASSWORD.to_string()).await;
        assert!(matches!(result, Err(AuthError::PasswordReused)));
    }

    #[tokio::test]
    async fn request_is_generic_for_unknown_accounts() {
        let env = Env::new();
        env.reset_use_case().request("ghost@x.com").await.unwrap();
        assert_eq!(env.mailer.count_to("reset", "ghost@x.com"), 0);
    }

    #[tokio::test]
    async fn change_password_verifies_current_and_history() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let mut user = env.user_by_email("a@x.com").await;

        let use_case = ChangePasswordUseCase::new(env.repo.clone(), env.config.clone());

        // Wrong current password
        let wrong = use_case
            .execute(
                &mut user,
                "Wr0ng-current!".to_string(),
                "N3w-P@ssword-42!".to_string(),
            )
            .await;
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));

        // Reusing the current password
        let mut user = env.user_by_email("a@x.com").await;
        let reused = use_case
            .execute(&mut user, PASSWORD.to_string(), PASSWORD.to_string())
            .await;
        assert!(matches!(reused, Err(AuthError::PasswordReused)));

        // A genuinely new password goes through
        let mut user = env.user_by_email("a@x.com").await;
        use_case
            .execute(
                &mut user,
                PASSWORD.to_string(),
                "N3w-P@ssword-42!".to_string(),
            )
            .await
            .unwrap();

        // And is itself blocked from the next change (history grew)
        let mut user = env.user_by_email("a@x.com").await;
        let back = use_case
            .execute(
                &mut user,
                "N3w-P@ssword-42!".to_string(),
                PASSWORD.to_string(),
            )
            .await;
        assert!(matches!(back, Err(AuthError::PasswordReused)));
    }

    #[tokio::test]
    async fn history_store_outage_fails_closed() {
        let env = Env::new();
        env.register_verified("a@x.com", PASSWORD).await;
        let mut user = env.user_by_email("a@x.com").await;

        env.repo.set_history_failing(true);

        let use_case = ChangePasswordUseCase::new(env.repo.clone(), env.config.clone());
        let result = use_case
            .execute(
                &mut user,
                PASSWORD.to_string(),
                "N3w-P@ssword-42!".to_string(),
            )
            .await;

        // Treated as reused rather than silently allowed
        assert!(matches!(result, Err(AuthError::PasswordReused)));
    }
}

// ============================================================================
// OAuth identity resolution
// ============================================================================

mod oauth_tests {
    use super::*;

    fn google_identity(email: &str, provider_id: &str) -> OAuthIdentity {
        OAuthIdentity {
            provider: "google".to_string(),
            provider_id: provider_id.to_string(),
            email: email.to_string(),
            name: Some("B".to_string()),
            email_verified: true,
        }
    }

    fn callback_with_code() -> CallbackParams {
        CallbackParams {
            code: Some("authcode".to_string()),
            state: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn new_identity_merges_into_existing_account_by_email() {
        use crate::domain::repository::LinkedAccountRepository;

        let env = Env::new();
        let existing = env.register_verified("b@x.com", PASSWORD).await;

        let use_case = env.oauth_use_case(google_identity("b@x.com", "g-123"));
        let token = use_case
            .callback("google", callback_with_code())
            .await
            .unwrap();

        // Exactly one link, pointing at the pre-existing user
        let link = env
            .repo
            .find_link("google", "g-123")
            .await
            .unwrap()
            .expect("link created");
        assert_eq!(link.user_id, existing.user_id);

        // No duplicate user: the session resolves to the original account
        let resolved = env
            .session_service()
            .current_user(&token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.user_id, existing.user_id);
        assert!(resolved.has_password());

        // Second callback is idempotent
        let use_case = env.oauth_use_case(google_identity("b@x.com", "g-123"));
        use_case
            .callback("google", callback_with_code())
            .await
            .unwrap();
        let link = env.repo.find_link("google", "g-123").await.unwrap().unwrap();
        assert_eq!(link.user_id, existing.user_id);
    }

    #[tokio::test]
    async fn unseen_identity_creates_a_passwordless_verified_account() {
        let env = Env::new();

        let use_case = env.oauth_use_case(google_identity("c@x.com", "g-456"));
        let token = use_case
            .callback("google", callback_with_code())
            .await
            .unwrap();

        let user = env.user_by_email("c@x.com").await;
        assert!(user.email_verified);
        assert!(!user.has_password());
        assert!(!user.role.is_admin());

        // OAuth sessions are always persistent
        let resolved = env.session_service().current_user(&token).await.unwrap();
        assert!(resolved.is_some());
    }

    #[tokio::test]
    async fn privileged_email_gets_the_admin_role() {
        let env = Env::new();

        let use_case = env.oauth_use_case(google_identity("boss@x.com", "g-789"));
        use_case
            .callback("google", callback_with_code())
            .await
            .unwrap();

        assert!(env.user_by_email("boss@x.com").await.role.is_admin());
    }

    #[tokio::test]
    async fn provider_error_short_circuits_without_records() {
        use crate::domain::repository::UserRepository;

        let env = Env::new();
        let use_case = env.oauth_use_case(google_identity("d@x.com", "g-000"));

        let result = use_case
            .callback(
                "google",
                CallbackParams {
                    code: None,
                    state: None,
                    error: Some("access_denied".to_string()),
                },
            )
            .await;
        assert!(matches!(result, Err(AuthError::Provider(_))));

        // No partial user was left behind
        let email = crate::domain::value_object::email::Email::new("d@x.com").unwrap();
        assert!(!env.repo.exists_by_email(&email).await.unwrap());
    }

    #[tokio::test]
    async fn unverified_provider_email_is_rejected() {
        let env = Env::new();
        let mut identity = google_identity("e@x.com", "g-111");
        identity.email_verified = false;

        let use_case = env.oauth_use_case(identity);
        let result = use_case.callback("google", callback_with_code()).await;
        assert!(matches!(result, Err(AuthError::Provider(_))));
    }

    #[tokio::test]
    async fn authorize_url_carries_the_standard_parameters() {
        let env = Env::new();
        let use_case = env.oauth_use_case(google_identity("x@x.com", "g-1"));

        let url = use_case.authorize_url("google", "state-123").unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("state=state-123"));

        assert!(use_case.authorize_url("github", "s").is_err());
    }
}
