//! Two-Factor Engine
//!
//! TOTP secret/URI/QR generation, backup-code issuance and consumption,
//! email one-time codes, and the transient login challenge issued between
//! first-factor success and session creation.
//!
//! Setup is two-phase: `initiate` returns material without persisting
//! anything; only a verified `complete` commits the enabled state. Login
//! challenges are single-use - the read deletes the record, so a replayed
//! challenge id always fails.

use std::sync::Arc;

use platform::crypto::{constant_time_eq, random_backup_code, random_numeric_code};
use platform::kv::TtlStore;
use platform::mail::Mailer;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::domain::entity::backup_code::{self, BackupCode};
use crate::domain::entity::user::User;
use crate::domain::repository::{BackupCodeRepository, UserRepository};
use crate::domain::value_object::two_factor::{TotpSecret, TwoFactorMethod};
use crate::domain::value_object::user_id::UserId;
use crate::error::{AuthError, AuthResult};

const OTP_DIGITS: u32 = 6;

fn challenge_key(challenge_id: &str) -> String {
    format!("2fa:challenge:{}", challenge_id)
}

fn otp_key(email: &str) -> String {
    format!("2fa:otp:{}", email)
}

/// Setup material returned by `initiate`; nothing is persisted yet
pub enum TwoFactorSetup {
    Totp {
        /// Base32 secret for manual entry; echoed back in the completion proof
        secret: String,
        otpauth_url: String,
        /// QR code as base64-encoded PNG
        qr_code_base64: String,
        /// Provisional codes; the batch stored at completion replaces them
        backup_codes: Vec<String>,
    },
    /// Code dispatched to the user's email
    Email,
}

/// Proof presented to complete a pending setup
///
/// Tagged per method so invalid field combinations are unrepresentable.
pub enum TwoFactorProof {
    Totp { secret: String, code: String },
    Email { code: String },
}

/// Pending login challenge handed to the browser after first-factor success
#[derive(Debug, Clone)]
pub struct LoginChallenge {
    pub challenge_id: String,
    pub method: TwoFactorMethod,
}

/// KV payload behind a challenge id
#[derive(Serialize, Deserialize)]
struct ChallengeRecord {
    user_id: String,
    method: TwoFactorMethod,
}

/// Two-factor engine service
pub struct TwoFactorService<R>
where
    R: UserRepository + BackupCodeRepository,
{
    repo: Arc<R>,
    kv: Arc<dyn TtlStore>,
    mailer: Arc<dyn Mailer>,
    config: Arc<AuthConfig>,
}

impl<R> TwoFactorService<R>
where
    R: UserRepository + BackupCodeRepository,
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

    fn new_code_batch(&self) -> Vec<String> {
        (0..self.config.backup_code_count)
            .map(|_| random_backup_code())
            .collect()
    }

    /// Begin setup for the given method
    ///
    /// For `totp`, returns secret + provisioning URI + QR + provisional
    /// backup codes without persisting anything. For `email`, stores a
    /// 6-digit code under the user's email with a short TTL and dispatches
    /// it.
    pub async fn initiate(&self, user: &User, method: TwoFactorMethod) -> AuthResult<TwoFactorSetup> {
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        match method {
            TwoFactorMethod::Totp => {
                let secret = TotpSecret::generate();
                let account = user.email.as_str();

                Ok(TwoFactorSetup::Totp {
                    otpauth_url: secret.get_otpauth_url(account)?,
                    qr_code_base64: secret.generate_qr_code(account)?,
                    secret: secret.as_base32().to_string(),
                    backup_codes: self.new_code_batch(),
                })
            }
            TwoFactorMethod::Email => {
                let code = random_numeric_code(OTP_DIGITS);
                self.kv
                    .setex(
                        &otp_key(user.email.as_str()),
                        self.config.otp_ttl.as_secs(),
                        &code,
                    )
                    .await?;

                if let Err(e) = self
                    .mailer
                    .send_two_factor_code_email(user.email.as_str(), &code, user.name.as_deref())
                    .await
                {
                    tracing::warn!(error = %e, "Failed to dispatch setup code email");
                }

                Ok(TwoFactorSetup::Email)
            }
        }
    }

    /// Verify the setup proof and commit the enabled state
    ///
    /// Only on success does anything persist: the enabled flag, the method,
    /// the secret (totp), and a fresh backup-code batch which is returned to
    /// the caller and replaces any prior batch.
    pub async fn complete(&self, user: &mut User, proof: TwoFactorProof) -> AuthResult<Vec<String>> {
        if user.two_factor_enabled {
            return Err(AuthError::TwoFactorAlreadyEnabled);
        }

        match proof {
            TwoFactorProof::Totp { secret, code } => {
                let secret = TotpSecret::from_base32(secret)
                    .map_err(|_| AuthError::validation("secret", "Invalid TOTP secret"))?;

                if !secret.verify(&code, user.email.as_str())? {
                    return Err(AuthError::InvalidTwoFactorCode);
                }

                user.enable_two_factor(TwoFactorMethod::Totp, Some(secret));
            }
            TwoFactorProof::Email { code } => {
                if !self.consume_email_otp(user.email.as_str(), &code).await? {
                    return Err(AuthError::InvalidTwoFactorCode);
                }

                user.enable_two_factor(TwoFactorMethod::Email, None);
            }
        }

        self.repo.update_user(user).await?;

        let codes = self.store_fresh_batch(&user.user_id).await?;

        tracing::info!(
            user_id = %user.user_id,
            method = %user.two_factor_method.expect("method just set"),
            "Two-factor authentication enabled"
        );

        Ok(codes)
    }

    /// Clear the second factor and every backup code in one logical operation
    ///
    /// Codes are deleted before the flag is cleared so no observable state
    /// ever has the flag off while codes remain.
    pub async fn disable(&self, user: &mut User) -> AuthResult<()> {
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        self.repo.delete_backup_codes(&user.user_id).await?;

        user.disable_two_factor();
        self.repo.update_user(user).await?;

        tracing::info!(user_id = %user.user_id, "Two-factor authentication disabled");

        Ok(())
    }

    /// Replace the backup-code batch
    ///
    /// Delete-all-then-insert-all; a reader never sees a mix of two
    /// generations, and codes from the prior batch stop verifying.
    pub async fn regenerate_backup_codes(&self, user: &User) -> AuthResult<Vec<String>> {
        if !user.two_factor_enabled {
            return Err(AuthError::TwoFactorNotEnabled);
        }

        let codes = self.store_fresh_batch(&user.user_id).await?;

        tracing::info!(user_id = %user.user_id, "Backup codes regenerated");

        Ok(codes)
    }

    async fn store_fresh_batch(&self, user_id: &UserId) -> AuthResult<Vec<String>> {
        let codes = self.new_code_batch();
        let records: Vec<BackupCode> = codes
            .iter()
            .map(|code| BackupCode::new(user_id.clone(), code))
            .collect();
        self.repo.replace_backup_codes(user_id, &records).await?;
        Ok(codes)
    }

    /// Create a pending login challenge after first-factor success
    ///
    /// For the email method this also issues and dispatches the one-time
    /// code.
    pub async fn issue_login_challenge(&self, user: &User) -> AuthResult<LoginChallenge> {
        let method = user
            .two_factor_method
            .ok_or_else(|| AuthError::Internal("2FA enabled without a method".to_string()))?;

        let challenge_id = Uuid::new_v4().to_string();
        let record = ChallengeRecord {
            user_id: user.user_id.to_string(),
            method,
        };

        self.kv
            .setex(
                &challenge_key(&challenge_id),
                self.config.challenge_ttl.as_secs(),
                &serde_json::to_string(&record)
                    .map_err(|e| AuthError::Internal(e.to_string()))?,
            )
            .await?;

        if method == TwoFactorMethod::Email {
            let code = random_numeric_code(OTP_DIGITS);
            self.kv
                .setex(
                    &otp_key(user.email.as_str()),
                    self.config.otp_ttl.as_secs(),
                    &code,
                )
                .await?;

            if let Err(e) = self
                .mailer
                .send_two_factor_code_email(user.email.as_str(), &code, user.name.as_deref())
                .await
            {
                tracing::warn!(error = %e, "Failed to dispatch sign-in code email");
            }
        }

        tracing::info!(user_id = %user.user_id, method = %method, "Login challenge issued");

        Ok(LoginChallenge {
            challenge_id,
            method,
        })
    }

    /// Resolve and consume a login challenge, then verify the supplied code
    ///
    /// The challenge read is single-use (read-then-delete); a replayed
    /// challenge id fails. The code is checked against the method-specific
    /// path first, then against the backup codes. All failures collapse to
    /// the same error.
    pub async fn verify_login_challenge(
        &self,
        challenge_id: &str,
        code: &str,
    ) -> AuthResult<User> {
        let Some(raw) = self.kv.get_del(&challenge_key(challenge_id)).await? else {
            return Err(AuthError::InvalidTwoFactorCode);
        };

        let Ok(record) = serde_json::from_str::<ChallengeRecord>(&raw) else {
            return Err(AuthError::InvalidTwoFactorCode);
        };

        let Some(user_id) = UserId::parse(&record.user_id) else {
            return Err(AuthError::InvalidTwoFactorCode);
        };

        // The challenge can outlive the account state it was issued for
        let user = self
            .repo
            .find_user_by_id(&user_id)
            .await?
            .filter(|u| u.two_factor_enabled)
            .ok_or(AuthError::InvalidTwoFactorCode)?;

        let primary_ok = match record.method {
            TwoFactorMethod::Totp => match &user.totp_secret {
                Some(secret) => secret.verify(code, user.email.as_str())?,
                None => false,
            },
            TwoFactorMethod::Email => self.consume_email_otp(user.email.as_str(), code).await?,
        };

        if primary_ok || self.consume_backup(&user.user_id, code).await? {
            tracing::info!(user_id = %user.user_id, "Login challenge verified");
            Ok(user)
        } else {
            Err(AuthError::InvalidTwoFactorCode)
        }
    }

    /// Compare against the stored email OTP; invalidate it on success
    async fn consume_email_otp(&self, email: &str, code: &str) -> AuthResult<bool> {
        let key = otp_key(email);
        let Some(stored) = self.kv.get(&key).await? else {
            return Ok(false);
        };

        if !constant_time_eq(stored.as_bytes(), code.trim().as_bytes()) {
            return Ok(false);
        }

        self.kv.del(&key).await?;
        Ok(true)
    }

    async fn consume_backup(&self, user_id: &UserId, code: &str) -> AuthResult<bool> {
        self.repo
            .consume_backup_code(user_id, &backup_code::hash_code(code))
            .await
    }
}
