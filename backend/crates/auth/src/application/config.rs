//! Application Configuration
//!
//! Configuration for the auth application layer. Purpose-token TTLs are
//! deliberately NOT here: they are fixed per purpose in the token service so
//! a caller can never widen them.

use std::collections::HashMap;
use std::time::Duration;

/// Re-export SameSite from platform
pub use platform::cookie::SameSite;

/// One OAuth provider's endpoints and client credentials
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// Authorization endpoint the browser is redirected to
    pub authorize_endpoint: String,
    /// Token endpoint for the code exchange
    pub token_endpoint: String,
    /// Userinfo endpoint for the profile fetch
    pub userinfo_endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Space-separated scope list
    pub scopes: String,
}

/// Auth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Session cookie name
    pub session_cookie_name: String,
    /// Session secret key for HMAC signing (32 bytes)
    pub session_secret: [u8; 32],
    /// Secret key for purpose-bound tokens (32 bytes)
    pub token_secret: [u8; 32],
    /// Session TTL without "Remember Me" (24 hours)
    pub session_ttl: Duration,
    /// Session TTL with "Remember Me" (30 days)
    pub session_ttl_persistent: Duration,
    /// Whether to require Secure cookie
    pub cookie_secure: bool,
    /// SameSite policy
    pub cookie_same_site: SameSite,
    /// Password pepper (optional, application-wide secret)
    pub password_pepper: Option<Vec<u8>>,
    /// TTL for email one-time codes (5 minutes)
    pub otp_ttl: Duration,
    /// TTL for pending two-factor login challenges (5 minutes)
    pub challenge_ttl: Duration,
    /// Backup codes issued per batch
    pub backup_code_count: usize,
    /// Emails granted the admin role on first OAuth sign-in
    pub privileged_emails: Vec<String>,
    /// Public base URL, used to build links in outbound email
    pub base_url: String,
    /// Configured OAuth providers by name
    pub oauth_providers: HashMap<String, OAuthProviderConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie_name: "bf_session".to_string(),
            session_secret: [0u8; 32],
            token_secret: [0u8; 32],
            session_ttl: Duration::from_secs(24 * 3600),
            session_ttl_persistent: Duration::from_secs(30 * 24 * 3600),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            password_pepper: None,
            otp_ttl: Duration::from_secs(5 * 60),
            challenge_ttl: Duration::from_secs(5 * 60),
            backup_code_count: 10,
            privileged_emails: Vec::new(),
            base_url: "http://localhost:3000".to_string(),
            oauth_providers: HashMap::new(),
        }
    }
}

impl AuthConfig {
    /// Create config with random secrets (for development)
    pub fn with_random_secrets() -> Self {
        let mut session_secret = [0u8; 32];
        session_secret.copy_from_slice(&platform::crypto::random_bytes(32));
        let mut token_secret = [0u8; 32];
        token_secret.copy_from_slice(&platform::crypto::random_bytes(32));
        Self {
            session_secret,
            token_secret,
            ..Default::default()
        }
    }

    /// Create config for development (insecure cookie)
    pub fn development() -> Self {
        Self {
            cookie_secure: false,
            ..Self::with_random_secrets()
        }
    }

    /// Session TTL for the given persistence flag
    pub fn session_ttl_for(&self, persistent: bool) -> Duration {
        if persistent {
            self.session_ttl_persistent
        } else {
            self.session_ttl
        }
    }

    /// Get password pepper as slice
    pub fn pepper(&self) -> Option<&[u8]> {
        self.password_pepper.as_deref()
    }

    /// Whether this email is on the privileged allow-list
    pub fn is_privileged_email(&self, email: &str) -> bool {
        self.privileged_emails
            .iter()
            .any(|e| e.eq_ignore_ascii_case(email))
    }

    /// Cookie settings derived from this config
    pub fn cookie_config(&self) -> platform::cookie::CookieConfig {
        platform::cookie::CookieConfig {
            name: self.session_cookie_name.clone(),
            secure: self.cookie_secure,
            http_only: true,
            same_site: self.cookie_same_site,
            path: "/".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_ttl_is_longer() {
        let config = AuthConfig::default();
        assert!(config.session_ttl_for(true) > config.session_ttl_for(false));
    }

    #[test]
    fn test_privileged_email_check_is_case_insensitive() {
        let config = AuthConfig {
            privileged_emails: vec!["admin@example.com".to_string()],
            ..Default::default()
        };
        assert!(config.is_privileged_email("Admin@Example.COM"));
        assert!(!config.is_privileged_email("user@example.com"));
    }

    #[test]
    fn test_random_secrets_differ() {
        let config = AuthConfig::with_random_secrets();
        assert_ne!(config.session_secret, [0u8; 32]);
        assert_ne!(config.session_secret, config.token_secret);
    }
}
