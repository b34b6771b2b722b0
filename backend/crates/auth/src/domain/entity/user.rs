//! User Entity
//!
//! The identity record. Carries the credential hash, verification state,
//! two-factor state, and the server-side mirrors for purpose-bound tokens.
//! A signed token is only honored while it matches the still-unexpired
//! mirror on this row, which lets the server revoke a token early by
//! clearing the mirror.

use chrono::{DateTime, Utc};
use platform::password::HashedPassword;

use crate::domain::value_object::{
    email::Email,
    two_factor::{TotpSecret, TwoFactorMethod},
    user_id::UserId,
    user_role::UserRole,
};

/// User entity
#[derive(Debug, Clone)]
pub struct User {
    /// Internal UUID identifier
    pub user_id: UserId,
    /// Unique email (login identifier)
    pub email: Email,
    /// Display name
    pub name: Option<String>,
    /// Password hash; `None` for OAuth-only accounts
    pub password_hash: Option<HashedPassword>,
    /// Whether the email address has been confirmed
    pub email_verified: bool,
    /// Role (user, admin)
    pub role: UserRole,
    /// Whether a second factor is required at login
    pub two_factor_enabled: bool,
    /// Configured second-factor method
    pub two_factor_method: Option<TwoFactorMethod>,
    /// TOTP secret (present only for the totp method)
    pub totp_secret: Option<TotpSecret>,
    /// Mirror of the outstanding email-verification token
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    /// Mirror of the outstanding password-reset token
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new user from registration (password-based, unverified email)
    pub fn new(email: Email, name: Option<String>, password_hash: HashedPassword) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::new(),
            email,
            name,
            password_hash: Some(password_hash),
            email_verified: false,
            role: UserRole::default(),
            two_factor_enabled: false,
            two_factor_method: None,
            totp_secret: None,
            verification_token: None,
            verification_token_expires_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new user from a first OAuth sign-in
    ///
    /// No password; the provider already verified the email.
    pub fn new_oauth(email: Email, name: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            user_id: UserId::new(),
            email,
            name,
            password_hash: None,
            email_verified: true,
            role,
            two_factor_enabled: false,
            two_factor_method: None,
            totp_secret: None,
            verification_token: None,
            verification_token_expires_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Replace the password hash
    pub fn set_password(&mut self, hash: HashedPassword) {
        self.password_hash = Some(hash);
        self.updated_at = Utc::now();
    }

    /// Mark the email address as confirmed
    pub fn mark_email_verified(&mut self) {
        self.email_verified = true;
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------
    // Purpose-token mirrors
    // ------------------------------------------------------------------

    pub fn set_verification_mirror(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.verification_token = Some(token);
        self.verification_token_expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    pub fn clear_verification_mirror(&mut self) {
        self.verification_token = None;
        self.verification_token_expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Exact-match check against the stored verification mirror
    pub fn verification_mirror_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.verification_token, self.verification_token_expires_at) {
            (Some(stored), Some(expires_at)) => stored == token && expires_at > now,
            _ => false,
        }
    }

    pub fn set_reset_mirror(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.reset_token = Some(token);
        self.reset_token_expires_at = Some(expires_at);
        self.updated_at = Utc::now();
    }

    pub fn clear_reset_mirror(&mut self) {
        self.reset_token = None;
        self.reset_token_expires_at = None;
        self.updated_at = Utc::now();
    }

    /// Exact-match check against the stored reset mirror
    pub fn reset_mirror_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.reset_token, self.reset_token_expires_at) {
            (Some(stored), Some(expires_at)) => stored == token && expires_at > now,
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Two-factor state
    // ------------------------------------------------------------------

    /// Enable a second factor after a verified setup
    pub fn enable_two_factor(&mut self, method: TwoFactorMethod, totp_secret: Option<TotpSecret>) {
        self.two_factor_enabled = true;
        self.two_factor_method = Some(method);
        self.totp_secret = totp_secret;
        self.updated_at = Utc::now();
    }

    /// Clear all second-factor state
    pub fn disable_two_factor(&mut self) {
        self.two_factor_enabled = false;
        self.two_factor_method = None;
        self.totp_secret = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use platform::password::ClearTextPassword;

    fn test_user() -> User {
        let hash = ClearTextPassword::new_unchecked("TestPassword123!".into())
            .hash(None)
            .unwrap();
        User::new(Email::new("a@example.com").unwrap(), None, hash)
    }

    #[test]
    fn test_new_user_defaults() {
        let user = test_user();
        assert!(!user.email_verified);
        assert!(!user.two_factor_enabled);
        assert!(user.has_password());
        assert_eq!(user.role, UserRole::User);
    }

    #[test]
    fn test_oauth_user_is_verified_and_passwordless() {
        let user = User::new_oauth(
            Email::new("b@example.com").unwrap(),
            Some("B".into()),
            UserRole::Admin,
        );
        assert!(user.email_verified);
        assert!(!user.has_password());
        assert_eq!(user.role, UserRole::Admin);
    }

    #[test]
    fn test_verification_mirror_matching() {
        let mut user = test_user();
        let now = Utc::now();

        assert!(!user.verification_mirror_matches("tok", now));

        user.set_verification_mirror("tok".into(), now + Duration::hours(24));
        assert!(user.verification_mirror_matches("tok", now));
        assert!(!user.verification_mirror_matches("other", now));

        // Expired mirror never matches, even with the right token
        assert!(!user.verification_mirror_matches("tok", now + Duration::hours(25)));

        user.clear_verification_mirror();
        assert!(!user.verification_mirror_matches("tok", now));
    }

    #[test]
    fn test_reset_mirror_matching() {
        let mut user = test_user();
        let now = Utc::now();

        user.set_reset_mirror("tok".into(), now + Duration::hours(1));
        assert!(user.reset_mirror_matches("tok", now));

        user.clear_reset_mirror();
        assert!(!user.reset_mirror_matches("tok", now));
    }

    #[test]
    fn test_two_factor_enable_disable() {
        let mut user = test_user();
        let secret = crate::domain::value_object::two_factor::TotpSecret::generate();

        user.enable_two_factor(TwoFactorMethod::Totp, Some(secret));
        assert!(user.two_factor_enabled);
        assert_eq!(user.two_factor_method, Some(TwoFactorMethod::Totp));
        assert!(user.totp_secret.is_some());

        user.disable_two_factor();
        assert!(!user.two_factor_enabled);
        assert!(user.two_factor_method.is_none());
        assert!(user.totp_secret.is_none());
    }
}
