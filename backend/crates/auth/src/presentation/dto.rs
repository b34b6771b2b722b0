//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

use crate::domain::value_object::two_factor::TwoFactorMethod;

// ============================================================================
// Register / Verify Email
// ============================================================================

/// Register request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Register response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: String,
    /// The account cannot be considered active until the email is confirmed
    pub verification_required: bool,
}

/// Verify email request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Resend verification request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendVerificationRequest {
    pub email: String,
}

// ============================================================================
// Sign In
// ============================================================================

/// Sign in request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Sign in response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub authenticated: bool,
    /// True when a second factor is still required
    pub requires_two_factor: bool,
    /// Challenge to present at the two-factor step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<TwoFactorMethod>,
}

/// Two-factor sign in request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSignInRequest {
    pub challenge_id: String,
    pub code: String,
    #[serde(default)]
    pub remember_me: bool,
}

// ============================================================================
// Password Lifecycle
// ============================================================================

/// Forgot password request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Reset password request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Change password request (authenticated)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

// ============================================================================
// Two-Factor Setup
// ============================================================================

/// Two-factor initiate request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorInitiateRequest {
    pub method: TwoFactorMethod,
}

/// Two-factor initiate response
///
/// The TOTP fields are absent for the email method (the code went out by
/// mail instead).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorInitiateResponse {
    pub method: TwoFactorMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otpauth_url: Option<String>,
    /// QR code as base64-encoded PNG
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_codes: Option<Vec<String>>,
}

/// Two-factor complete request
///
/// Tagged by method so the required fields are enforced by shape: totp
/// completion carries the secret it verifies, email completion only the
/// code.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum TwoFactorCompleteRequest {
    #[serde(rename_all = "camelCase")]
    Totp { secret: String, code: String },
    #[serde(rename_all = "camelCase")]
    Email { code: String },
}

/// Backup codes response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupCodesResponse {
    pub backup_codes: Vec<String>,
}

// ============================================================================
// Session / User Info
// ============================================================================

/// Current user info
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub two_factor_method: Option<TwoFactorMethod>,
}

/// Session status response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfoResponse>,
}

/// Generic acknowledgement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_factor_complete_request_is_tagged() {
        let totp: TwoFactorCompleteRequest =
            serde_json::from_str(r#"{"method":"totp","secret":"ABC","code":"123456"}"#).unwrap();
        assert!(matches!(totp, TwoFactorCompleteRequest::Totp { .. }));

        let email: TwoFactorCompleteRequest =
            serde_json::from_str(r#"{"method":"email","code":"123456"}"#).unwrap();
        assert!(matches!(email, TwoFactorCompleteRequest::Email { .. }));

        // Email completion must not accept a secret, totp must require one
        assert!(
            serde_json::from_str::<TwoFactorCompleteRequest>(r#"{"method":"totp","code":"1"}"#)
                .is_err()
        );
    }

    #[test]
    fn test_sign_in_request_defaults_remember_me() {
        let req: SignInRequest =
            serde_json::from_str(r#"{"email":"a@x.com","password":"p"}"#).unwrap();
        assert!(!req.remember_me);
    }
}
