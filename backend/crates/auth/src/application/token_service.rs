//! Token Service
//!
//! Signs and verifies short-lived purpose-bound tokens (email verification,
//! password reset). TTLs are fixed per purpose - callers cannot widen them.
//!
//! Signature validity alone is never sufficient: consuming use cases must
//! also check the server-side mirror on the user row (exact string equality
//! and mirror-not-expired), which is what makes a token single-use and
//! revocable before its embedded expiry.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use derive_more::Display;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::domain::value_object::{email::Email, user_id::UserId};

/// Fixed lifetime of email-verification tokens
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Fixed lifetime of password-reset tokens
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Declared use of a token; a token is rejected for any other use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    #[display("verification")]
    Verification,
    #[display("reset")]
    Reset,
}

impl TokenPurpose {
    /// Per-purpose TTL, not caller-configurable
    pub const fn ttl(&self) -> Duration {
        match self {
            TokenPurpose::Verification => VERIFICATION_TOKEN_TTL,
            TokenPurpose::Reset => RESET_TOKEN_TTL,
        }
    }
}

/// Signed token payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeTokenClaims {
    pub user_id: String,
    pub email: String,
    #[serde(rename = "type")]
    pub purpose: TokenPurpose,
    /// Expiry as unix seconds
    pub exp: i64,
}

/// A freshly issued token together with its expiry, for the mirror fields
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 purpose-token signer/verifier
#[derive(Clone)]
pub struct TokenService {
    secret: [u8; 32],
}

impl TokenService {
    pub fn new(secret: [u8; 32]) -> Self {
        Self { secret }
    }

    /// Issue a signed token for `purpose`; TTL is fixed per purpose
    pub fn issue(&self, user_id: &UserId, email: &Email, purpose: TokenPurpose) -> IssuedToken {
        self.issue_at(user_id, email, purpose, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: &UserId,
        email: &Email,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
    ) -> IssuedToken {
        let expires_at = now
            + chrono::Duration::from_std(purpose.ttl()).expect("purpose TTLs are in range");

        let claims = PurposeTokenClaims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            purpose,
            exp: expires_at.timestamp(),
        };

        let payload = URL_SAFE_NO_PAD
            .encode(serde_json::to_vec(&claims).expect("claims serialize to JSON"));

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        IssuedToken {
            token: format!("{}.{}", payload, signature),
            expires_at,
        }
    }

    /// Verify signature, expiry, and purpose
    ///
    /// Returns `None` on any failure; callers must not distinguish reasons
    /// to the end user.
    pub fn verify(&self, token: &str, expected: TokenPurpose) -> Option<PurposeTokenClaims> {
        self.verify_at(token, expected, Utc::now())
    }

    fn verify_at(
        &self,
        token: &str,
        expected: TokenPurpose,
        now: DateTime<Utc>,
    ) -> Option<PurposeTokenClaims> {
        let (payload, signature_b64) = token.split_once('.')?;

        let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let claims: PurposeTokenClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).ok()?).ok()?;

        if claims.purpose != expected {
            return None;
        }

        if claims.exp <= now.timestamp() {
            return None;
        }

        Some(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new([7u8; 32])
    }

    fn subject() -> (UserId, Email) {
        (UserId::new(), Email::new("a@example.com").unwrap())
    }

    #[test]
    fn test_issue_verify_roundtrip() {
        let service = service();
        let (user_id, email) = subject();

        let issued = service.issue(&user_id, &email, TokenPurpose::Reset);
        let claims = service.verify(&issued.token, TokenPurpose::Reset).unwrap();

        assert_eq!(claims.user_id, user_id.to_string());
        assert_eq!(claims.email, email.to_string());
        assert_eq!(claims.purpose, TokenPurpose::Reset);
    }

    #[test]
    fn test_purpose_mismatch_is_rejected() {
        let service = service();
        let (user_id, email) = subject();

        // A reset token is not a verification token even with a valid signature
        let issued = service.issue(&user_id, &email, TokenPurpose::Reset);
        assert!(service.verify(&issued.token, TokenPurpose::Verification).is_none());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let service = service();
        let (user_id, email) = subject();

        let issued = service.issue_at(
            &user_id,
            &email,
            TokenPurpose::Reset,
            Utc::now() - chrono::Duration::hours(2),
        );
        assert!(service.verify(&issued.token, TokenPurpose::Reset).is_none());
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let service = service();
        let (user_id, email) = subject();

        let issued = service.issue(&user_id, &email, TokenPurpose::Verification);

        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert!(service.verify(&tampered, TokenPurpose::Verification).is_none());

        // Swap payloads between two tokens
        let other = service.issue(
            &UserId::new(),
            &Email::new("b@example.com").unwrap(),
            TokenPurpose::Verification,
        );
        let (payload, _) = issued.token.split_once('.').unwrap();
        let (_, other_sig) = other.token.split_once('.').unwrap();
        let spliced = format!("{}.{}", payload, other_sig);
        assert!(service.verify(&spliced, TokenPurpose::Verification).is_none());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let (user_id, email) = subject();
        let issued = service().issue(&user_id, &email, TokenPurpose::Reset);

        let other = TokenService::new([8u8; 32]);
        assert!(other.verify(&issued.token, TokenPurpose::Reset).is_none());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let service = service();
        assert!(service.verify("", TokenPurpose::Reset).is_none());
        assert!(service.verify("no-dot-here", TokenPurpose::Reset).is_none());
        assert!(service.verify("a.b.c", TokenPurpose::Reset).is_none());
    }

    #[test]
    fn test_fixed_ttls() {
        assert_eq!(TokenPurpose::Verification.ttl(), VERIFICATION_TOKEN_TTL);
        assert_eq!(TokenPurpose::Reset.ttl(), RESET_TOKEN_TTL);
        assert!(TokenPurpose::Verification.ttl() > TokenPurpose::Reset.ttl());
    }
}
