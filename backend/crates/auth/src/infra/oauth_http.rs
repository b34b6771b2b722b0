//! HTTP Identity Provider Client
//!
//! Standard authorization-code exchange over HTTPS followed by a userinfo
//! fetch. Provider failures never carry internal detail to the end user;
//! the use case maps them to an error redirect.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::config::OAuthProviderConfig;
use crate::application::oauth::{IdentityProviderClient, OAuthIdentity};
use crate::error::{AuthError, AuthResult};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserinfoResponse {
    /// OIDC subject; some providers use `id` instead
    sub: Option<String>,
    id: Option<serde_json::Value>,
    email: Option<String>,
    name: Option<String>,
    email_verified: Option<bool>,
}

/// Production identity-provider client
pub struct HttpIdentityProviderClient {
    http: reqwest::Client,
}

impl HttpIdentityProviderClient {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builds with static config");
        Self { http }
    }
}

impl Default for HttpIdentityProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProviderClient for HttpIdentityProviderClient {
    async fn authenticate(
        &self,
        provider: &str,
        config: &OAuthProviderConfig,
        code: &str,
    ) -> AuthResult<OAuthIdentity> {
        let token_response = self
            .http
            .post(&config.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("redirect_uri", config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("Token exchange failed: {}", e)))?;

        if !token_response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "Token endpoint returned {}",
                token_response.status()
            )));
        }

        let token: TokenResponse = token_response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Bad token response: {}", e)))?;

        let userinfo_response = self
            .http
            .get(&config.userinfo_endpoint)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("Profile fetch failed: {}", e)))?;

        if !userinfo_response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "Userinfo endpoint returned {}",
                userinfo_response.status()
            )));
        }

        let profile: UserinfoResponse = userinfo_response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Bad userinfo response: {}", e)))?;

        let provider_id = profile
            .sub
            .or_else(|| {
                profile.id.map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
            })
            .ok_or_else(|| AuthError::Provider("Profile carried no subject id".to_string()))?;

        let email = profile
            .email
            .ok_or_else(|| AuthError::Provider("Profile carried no email".to_string()))?;

        Ok(OAuthIdentity {
            provider: provider.to_string(),
            provider_id,
            email,
            name: profile.name,
            // Providers that omit the claim are taken at their word; ones
            // that set it false are rejected downstream.
            email_verified: profile.email_verified.unwrap_or(true),
        })
    }
}
