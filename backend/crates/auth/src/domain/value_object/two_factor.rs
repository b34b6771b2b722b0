//! Two-Factor Value Objects
//!
//! The second-factor method selector and the TOTP secret wrapper
//! (Google Authenticator compatible settings).

use crate::error::{AuthError, AuthResult};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, Secret, TOTP};

/// TOTP configuration constants
const TOTP_DIGITS: usize = 6;
const TOTP_STEP: u64 = 30;
/// Steps of tolerance either side of the current window (±60s clock drift)
const TOTP_SKEW: u8 = 2;
const TOTP_ISSUER: &str = "Brightfold";

/// Second-factor method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TwoFactorMethod {
    #[display("totp")]
    Totp,
    #[display("email")]
    Email,
}

impl TwoFactorMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TwoFactorMethod::Totp => "totp",
            TwoFactorMethod::Email => "email",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "totp" => Some(TwoFactorMethod::Totp),
            "email" => Some(TwoFactorMethod::Email),
            _ => None,
        }
    }
}

/// TOTP secret for two-factor authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpSecret {
    /// Base32-encoded secret
    secret_base32: String,
}

impl TotpSecret {
    /// Generate a new random TOTP secret
    pub fn generate() -> Self {
        let secret = Secret::generate_secret();
        Self {
            secret_base32: secret.to_encoded().to_string(),
        }
    }

    /// Create from a base32-encoded string (from database or setup request)
    pub fn from_base32(secret: impl Into<String>) -> AuthResult<Self> {
        let secret_str = secret.into();
        // Validate by trying to decode
        Secret::Encoded(secret_str.clone())
            .to_bytes()
            .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {}", e)))?;

        Ok(Self {
            secret_base32: secret_str,
        })
    }

    /// Get the base32-encoded secret for storage
    pub fn as_base32(&self) -> &str {
        &self.secret_base32
    }

    /// Create a TOTP instance for this secret
    fn to_totp(&self, account_name: &str) -> AuthResult<TOTP> {
        let secret = Secret::Encoded(self.secret_base32.clone());

        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW,
            TOTP_STEP,
            secret
                .to_bytes()
                .map_err(|e| AuthError::Internal(format!("Invalid TOTP secret: {}", e)))?,
            Some(TOTP_ISSUER.to_string()),
            account_name.to_string(),
        )
        .map_err(|e| AuthError::Internal(format!("Failed to create TOTP: {}", e)))
    }

    /// Verify a TOTP code within the tolerance window
    pub fn verify(&self, code: &str, account_name: &str) -> AuthResult<bool> {
        let totp = self.to_totp(account_name)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Generate current TOTP code (for testing)
    #[cfg(test)]
    pub fn generate_current(&self, account_name: &str) -> AuthResult<String> {
        let totp = self.to_totp(account_name)?;
        totp.generate_current()
            .map_err(|e| AuthError::Internal(format!("Failed to generate TOTP: {}", e)))
    }

    /// Generate QR code as base64-encoded PNG
    pub fn generate_qr_code(&self, account_name: &str) -> AuthResult<String> {
        let totp = self.to_totp(account_name)?;
        totp.get_qr_base64()
            .map_err(|e| AuthError::Internal(format!("Failed to generate QR code: {}", e)))
    }

    /// Get the otpauth:// URL for manual entry
    pub fn get_otpauth_url(&self, account_name: &str) -> AuthResult<String> {
        let totp = self.to_totp(account_name)?;
        Ok(totp.get_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_string_roundtrip() {
        assert_eq!(TwoFactorMethod::from_str_opt("totp"), Some(TwoFactorMethod::Totp));
        assert_eq!(
            TwoFactorMethod::from_str_opt("email"),
            Some(TwoFactorMethod::Email)
        );
        assert_eq!(TwoFactorMethod::from_str_opt("sms"), None);
        assert_eq!(TwoFactorMethod::Totp.to_string(), "totp");
    }

    #[test]
    fn test_totp_secret_generate() {
        let secret = TotpSecret::generate();
        assert!(!secret.as_base32().is_empty());
    }

    #[test]
    fn test_totp_secret_verify() {
        let secret = TotpSecret::generate();
        let account = "test@example.com";

        let code = secret.generate_current(account).unwrap();
        assert!(secret.verify(&code, account).unwrap());

        assert!(!secret.verify("000000", account).unwrap());
    }

    #[test]
    fn test_totp_secret_from_base32() {
        let secret = TotpSecret::generate();
        let base32 = secret.as_base32().to_string();

        let restored = TotpSecret::from_base32(base32).unwrap();
        assert_eq!(secret.as_base32(), restored.as_base32());
    }

    #[test]
    fn test_totp_secret_rejects_garbage() {
        assert!(TotpSecret::from_base32("not base32 at all!!!").is_err());
    }

    #[test]
    fn test_totp_otpauth_url_carries_issuer() {
        let secret = TotpSecret::generate();
        let url = secret.get_otpauth_url("test@example.com").unwrap();
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("Brightfold"));
    }

    #[test]
    fn test_totp_qr_code() {
        let secret = TotpSecret::generate();
        let qr = secret.generate_qr_code("test@example.com").unwrap();
        assert!(!qr.is_empty());
    }
}
