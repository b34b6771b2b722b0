//! Outbound Email Dispatch
//!
//! Mail is fire-and-forget from the core's perspective: a delivery failure
//! must never roll back the state change that triggered it. Callers log
//! failures and continue.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use thiserror::Error;

/// Email dispatch errors
#[derive(Debug, Error)]
pub enum MailError {
    /// Transport could not be constructed
    #[error("Invalid mail configuration: {0}")]
    InvalidConfig(String),

    /// Message could not be built or sent
    #[error("Failed to send email: {0}")]
    SendFailed(String),
}

/// Outbound mail dispatcher
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Email-address verification link after registration
    async fn send_verification_email(
        &self,
        to: &str,
        link: &str,
        name: Option<&str>,
    ) -> Result<(), MailError>;

    /// Password reset link
    async fn send_reset_password_email(
        &self,
        to: &str,
        link: &str,
        name: Option<&str>,
    ) -> Result<(), MailError>;

    /// Two-factor one-time code
    async fn send_two_factor_code_email(
        &self,
        to: &str,
        code: &str,
        name: Option<&str>,
    ) -> Result<(), MailError>;

    /// Welcome message after successful verification
    async fn send_welcome_email(&self, to: &str, name: Option<&str>) -> Result<(), MailError>;
}

/// Configuration for SMTP email sending
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// SMTP server host (e.g., "smtp.resend.com")
    pub host: String,
    /// SMTP server port (465 implicit TLS is assumed)
    pub port: u16,
    /// SMTP username
    pub username: String,
    /// SMTP password (or API key)
    pub password: String,
    /// From email address
    pub from_email: String,
    /// From display name
    pub from_name: Option<String>,
}

impl SmtpConfig {
    /// Read config from environment variables
    ///
    /// Required: SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD, SMTP_FROM_EMAIL.
    /// Optional: SMTP_PORT (default 465), SMTP_FROM_NAME.
    /// Returns `None` when any required variable is missing so the caller
    /// can make an explicit fallback decision.
    pub fn from_env() -> Option<Self> {
        fn get_env(key: &str) -> Option<String> {
            std::env::var(key).ok().filter(|s| !s.is_empty())
        }

        Some(Self {
            host: get_env("SMTP_HOST")?,
            port: get_env("SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(465),
            username: get_env("SMTP_USERNAME")?,
            password: get_env("SMTP_PASSWORD")?,
            from_email: get_env("SMTP_FROM_EMAIL")?,
            from_name: get_env("SMTP_FROM_NAME"),
        })
    }
}

/// SMTP-backed mailer for production use
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: Option<String>,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self, MailError> {
        let creds = Credentials::new(config.username, config.password);

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::InvalidConfig(e.to_string()))?
            .port(config.port)
            .credentials(creds)
            .build();

        tracing::info!(host = %config.host, port = config.port, "SMTP transport configured");

        Ok(Self {
            transport,
            from_email: config.from_email,
            from_name: config.from_name,
        })
    }

    fn from_address(&self) -> String {
        match &self.from_name {
            Some(name) => format!("{} <{}>", name, self.from_email),
            None => self.from_email.clone(),
        }
    }

    fn greeting(name: Option<&str>) -> String {
        match name {
            Some(name) => format!("Hi {},", name),
            None => "Hi,".to_string(),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from_address()
                    .parse()
                    .map_err(|e| MailError::InvalidConfig(format!("from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| MailError::SendFailed(format!("to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        link: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        let body = format!(
            "{}\n\nConfirm your email address by opening this link:\n{}\n\n\
             The link is valid for 24 hours. If you didn't create an account, \
             you can safely ignore this email.",
            Self::greeting(name),
            link
        );
        self.send(to, "Verify your email address", body).await?;
        tracing::info!(to = %to, "Verification email sent");
        Ok(())
    }

    async fn send_reset_password_email(
        &self,
        to: &str,
        link: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        let body = format!(
            "{}\n\nReset your password by opening this link:\n{}\n\n\
             The link is valid for 1 hour. If you didn't request a reset, \
             you can safely ignore this email.",
            Self::greeting(name),
            link
        );
        self.send(to, "Reset your password", body).await?;
        tracing::info!(to = %to, "Password reset email sent");
        Ok(())
    }

    async fn send_two_factor_code_email(
        &self,
        to: &str,
        code: &str,
        name: Option<&str>,
    ) -> Result<(), MailError> {
        let body = format!(
            "{}\n\nYour sign-in code is: {}\n\n\
             The code expires in 5 minutes. If you didn't try to sign in, \
             change your password.",
            Self::greeting(name),
            code
        );
        self.send(to, "Your sign-in code", body).await?;
        tracing::info!(to = %to, "Two-factor code email sent");
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, name: Option<&str>) -> Result<(), MailError> {
        let body = format!(
            "{}\n\nYour email address is verified and your account is ready.",
            Self::greeting(name)
        );
        self.send(to, "Welcome aboard", body).await?;
        tracing::info!(to = %to, "Welcome email sent");
        Ok(())
    }
}

/// Tracing-backed mailer used when no SMTP transport is configured
///
/// Every dispatch succeeds and is written to the log instead of the wire.
/// Selecting this fallback is an explicit wiring decision, not a silent
/// default.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(
        &self,
        to: &str,
        link: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        tracing::info!(to = %to, link = %link, "LogMailer: verification email");
        Ok(())
    }

    async fn send_reset_password_email(
        &self,
        to: &str,
        link: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        tracing::info!(to = %to, link = %link, "LogMailer: reset password email");
        Ok(())
    }

    async fn send_two_factor_code_email(
        &self,
        to: &str,
        code: &str,
        _name: Option<&str>,
    ) -> Result<(), MailError> {
        tracing::info!(to = %to, code = %code, "LogMailer: two-factor code email");
        Ok(())
    }

    async fn send_welcome_email(&self, to: &str, _name: Option<&str>) -> Result<(), MailError> {
        tracing::info!(to = %to, "LogMailer: welcome email");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(
            mailer
                .send_verification_email("a@example.com", "https://x/verify?t=1", None)
                .await
                .is_ok()
        );
        assert!(
            mailer
                .send_welcome_email("a@example.com", Some("A"))
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_smtp_config_from_env_requires_all_fields() {
        // None of the SMTP_* variables are set in the test environment
        if std::env::var("SMTP_HOST").is_err() {
            assert!(SmtpConfig::from_env().is_none());
        }
    }
}
