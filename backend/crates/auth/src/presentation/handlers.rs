//! HTTP Handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use platform::kv::TtlStore;
use platform::mail::Mailer;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::config::AuthConfig;
use crate::application::oauth::{CallbackParams, IdentityProviderClient, OAuthSignInUseCase};
use crate::application::{
    ChangePasswordUseCase, RegisterInput, RegisterUseCase, ResetPasswordUseCase, SessionService,
    SignInInput, SignInOutput, SignInUseCase, TwoFactorProof, TwoFactorService, TwoFactorSetup,
    TwoFactorSignInInput, TwoFactorSignInUseCase, VerifyEmailUseCase,
};
use crate::domain::entity::user::User;
use crate::domain::repository::AuthRepository;
use crate::domain::value_object::two_factor::TwoFactorMethod;
use crate::error::{AuthError, AuthResult};
use crate::presentation::dto::{
    BackupCodesResponse, ChangePasswordRequest, ForgotPasswordRequest, MessageResponse,
    RegisterRequest, RegisterResponse, ResendVerificationRequest, ResetPasswordRequest,
    SessionStatusResponse, SignInRequest, SignInResponse, TwoFactorCompleteRequest,
    TwoFactorInitiateRequest, TwoFactorInitiateResponse, TwoFactorSignInRequest,
    UserInfoResponse, VerifyEmailRequest,
};

/// Where the OAuth callback lands the browser
const AFTER_OAUTH_PATH: &str = "/account";
const OAUTH_ERROR_PATH: &str = "/login?error=oauth";

/// TTL for the OAuth state parameter (seconds)
const OAUTH_STATE_TTL: u64 = 600;

/// Shared state for auth handlers
pub struct AuthAppState<R>
where
    R: AuthRepository,
{
    pub repo: Arc<R>,
    pub kv: Arc<dyn TtlStore>,
    pub mailer: Arc<dyn Mailer>,
    pub oauth: Arc<dyn IdentityProviderClient>,
    pub config: Arc<AuthConfig>,
}

// Manual impl: the Arc fields clone regardless of R
impl<R> Clone for AuthAppState<R>
where
    R: AuthRepository,
{
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            kv: self.kv.clone(),
            mailer: self.mailer.clone(),
            oauth: self.oauth.clone(),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Register / Verify Email
// ============================================================================

/// POST /register
pub async fn register<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepository,
{
    let use_case = RegisterUseCase::new(state.repo, state.mailer, state.config);

    let output = use_case
        .execute(RegisterInput {
            email: req.email,
            password: req.password,
            name: req.name,
        })
        .await?;

    // Deliberately no session cookie: the account is pending verification
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: output.user_id,
            verification_required: output.verification_required,
        }),
    ))
}

/// POST /verify-email
pub async fn verify_email<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<VerifyEmailRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: AuthRepository,
{
    let use_case = VerifyEmailUseCase::new(state.repo, state.mailer, state.config);
    use_case.execute(&req.token).await?;

    Ok(Json(MessageResponse {
        message: "Email verified".to_string(),
    }))
}

/// POST /resend-verification
pub async fn resend_verification<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<ResendVerificationRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: AuthRepository,
{
    let use_case = VerifyEmailUseCase::new(state.repo, state.mailer, state.config);
    use_case.resend(&req.email).await?;

    // Same response whether or not the account exists
    Ok(Json(MessageResponse {
        message: "If the account exists, a verification email is on its way".to_string(),
    }))
}

// ============================================================================
// Sign In / Sign Out
// ============================================================================

/// POST /signin
pub async fn sign_in<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<SignInRequest>,
) -> AuthResult<Response>
where
    R: AuthRepository,
{
    let use_case = SignInUseCase::new(
        state.repo,
        state.kv,
        state.mailer,
        state.config.clone(),
    );

    let output = use_case
        .execute(SignInInput {
            email: req.email,
            password: req.password,
            remember_me: req.remember_me,
        })
        .await?;

    match output {
        SignInOutput::Session { token, persistent } => {
            let cookie = session_cookie(&state.config, &token, persistent);
            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(SignInResponse {
                    authenticated: true,
                    requires_two_factor: false,
                    challenge_id: None,
                    method: None,
                }),
            )
                .into_response())
        }
        SignInOutput::TwoFactorRequired(challenge) => Ok((
            StatusCode::OK,
            Json(SignInResponse {
                authenticated: false,
                requires_two_factor: true,
                challenge_id: Some(challenge.challenge_id),
                method: Some(challenge.method),
            }),
        )
            .into_response()),
    }
}

/// POST /signin/two-factor
pub async fn two_factor_sign_in<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<TwoFactorSignInRequest>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepository,
{
    let use_case = TwoFactorSignInUseCase::new(
        state.repo,
        state.kv,
        state.mailer,
        state.config.clone(),
    );

    let output = use_case
        .execute(TwoFactorSignInInput {
            challenge_id: req.challenge_id,
            code: req.code,
            remember_me: req.remember_me,
        })
        .await?;

    let cookie = session_cookie(&state.config, &output.token, output.persistent);

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(SignInResponse {
            authenticated: true,
            requires_two_factor: false,
            challenge_id: None,
            method: None,
        }),
    ))
}

/// POST /signout
pub async fn sign_out<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepository,
{
    if let Some(token) = extract_session_cookie(&headers, &state.config.session_cookie_name) {
        let sessions = SessionService::new(state.repo, state.config.clone());
        // Revocation best-effort; the cookie is cleared either way
        let _ = sessions.destroy(&token).await;
    }

    let cookie = state.config.cookie_config().build_delete_cookie();

    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)]))
}

/// GET /me
pub async fn session_status<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
) -> AuthResult<Json<SessionStatusResponse>>
where
    R: AuthRepository,
{
    let user = current_user(&state, &headers).await?;

    Ok(Json(SessionStatusResponse {
        authenticated: user.is_some(),
        user: user.map(user_info),
    }))
}

// ============================================================================
// Password Lifecycle
// ============================================================================

/// POST /password/forgot
pub async fn forgot_password<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: AuthRepository,
{
    let use_case = ResetPasswordUseCase::new(state.repo, state.mailer, state.config);
    use_case.request(&req.email).await?;

    Ok(Json(MessageResponse {
        message: "If the account exists, a reset email is on its way".to_string(),
    }))
}

/// POST /password/reset
pub async fn reset_password<R>(
    State(state): State<AuthAppState<R>>,
    Json(req): Json<ResetPasswordRequest>,
) -> AuthResult<Json<MessageResponse>>
where
    R: AuthRepository,
{
    let use_case = ResetPasswordUseCase::new(state.repo, state.mailer, state.config);
    use_case.perform(&req.token, req.new_password).await?;

    Ok(Json(MessageResponse {
        message: "Password updated; sign in with the new password".to_string(),
    }))
}

/// POST /password/change
pub async fn change_password<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> AuthResult<StatusCode>
where
    R: AuthRepository,
{
    let mut user = require_user(&state, &headers).await?;

    let use_case = ChangePasswordUseCase::new(state.repo, state.config);
    use_case
        .execute(&mut user, req.current_password, req.new_password)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Two-Factor Setup (requires authentication)
// ============================================================================

/// POST /2fa/initiate
pub async fn two_factor_initiate<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
    Json(req): Json<TwoFactorInitiateRequest>,
) -> AuthResult<Json<TwoFactorInitiateResponse>>
where
    R: AuthRepository,
{
    let user = require_user(&state, &headers).await?;

    let service = TwoFactorService::new(state.repo, state.kv, state.mailer, state.config);

    let response = match service.initiate(&user, req.method).await? {
        TwoFactorSetup::Totp {
            secret,
            otpauth_url,
            qr_code_base64,
            backup_codes,
        } => TwoFactorInitiateResponse {
            method: TwoFactorMethod::Totp,
            secret: Some(secret),
            otpauth_url: Some(otpauth_url),
            qr_code: Some(qr_code_base64),
            backup_codes: Some(backup_codes),
        },
        TwoFactorSetup::Email => TwoFactorInitiateResponse {
            method: TwoFactorMethod::Email,
            secret: None,
            otpauth_url: None,
            qr_code: None,
            backup_codes: None,
        },
    };

    Ok(Json(response))
}

/// POST /2fa/complete
pub async fn two_factor_complete<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
    Json(req): Json<TwoFactorCompleteRequest>,
) -> AuthResult<Json<BackupCodesResponse>>
where
    R: AuthRepository,
{
    let mut user = require_user(&state, &headers).await?;

    let proof = match req {
        TwoFactorCompleteRequest::Totp { secret, code } => TwoFactorProof::Totp { secret, code },
        TwoFactorCompleteRequest::Email { code } => TwoFactorProof::Email { code },
    };

    let service = TwoFactorService::new(state.repo, state.kv, state.mailer, state.config);
    let backup_codes = service.complete(&mut user, proof).await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

/// POST /2fa/disable
pub async fn two_factor_disable<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
) -> AuthResult<StatusCode>
where
    R: AuthRepository,
{
    let mut user = require_user(&state, &headers).await?;

    let service = TwoFactorService::new(state.repo, state.kv, state.mailer, state.config);
    service.disable(&mut user).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /2fa/backup-codes
pub async fn regenerate_backup_codes<R>(
    State(state): State<AuthAppState<R>>,
    headers: HeaderMap,
) -> AuthResult<Json<BackupCodesResponse>>
where
    R: AuthRepository,
{
    let user = require_user(&state, &headers).await?;

    let service = TwoFactorService::new(state.repo, state.kv, state.mailer, state.config);
    let backup_codes = service.regenerate_backup_codes(&user).await?;

    Ok(Json(BackupCodesResponse { backup_codes }))
}

// ============================================================================
// OAuth
// ============================================================================

/// Callback query parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// GET /oauth/{provider}
pub async fn oauth_start<R>(
    State(state): State<AuthAppState<R>>,
    Path(provider): Path<String>,
) -> AuthResult<impl IntoResponse>
where
    R: AuthRepository,
{
    let use_case = OAuthSignInUseCase::new(state.repo, state.oauth, state.config);

    // The state parameter rides the KV store; the callback consumes it
    let oauth_state = Uuid::new_v4().to_string();
    state
        .kv
        .setex(&oauth_state_key(&oauth_state), OAUTH_STATE_TTL, &provider)
        .await?;

    let url = use_case.authorize_url(&provider, &oauth_state)?;

    Ok(redirect(&url))
}

/// GET /oauth/{provider}/callback
///
/// Errors end in a redirect, not a JSON body: the browser is mid-navigation.
pub async fn oauth_callback<R>(
    State(state): State<AuthAppState<R>>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Response
where
    R: AuthRepository,
{
    match oauth_callback_inner(&state, &provider, query).await {
        Ok(token) => {
            let cookie = session_cookie(&state.config, &token, true);
            (
                StatusCode::TEMPORARY_REDIRECT,
                [
                    (header::SET_COOKIE, cookie),
                    (header::LOCATION, AFTER_OAUTH_PATH.to_string()),
                ],
            )
                .into_response()
        }
        Err(e) => {
            // Log with detail, redirect without it
            tracing::warn!(provider = %provider, error = %e, "OAuth callback failed");
            redirect(OAUTH_ERROR_PATH)
        }
    }
}

async fn oauth_callback_inner<R>(
    state: &AuthAppState<R>,
    provider: &str,
    query: OAuthCallbackQuery,
) -> AuthResult<String>
where
    R: AuthRepository,
{
    // Consume the state parameter first; a replay or forgery stops here
    let stored = match query.state.as_deref() {
        Some(s) => state.kv.get_del(&oauth_state_key(s)).await?,
        None => None,
    };
    if stored.as_deref() != Some(provider) {
        return Err(AuthError::Provider("State mismatch".to_string()));
    }

    let use_case = OAuthSignInUseCase::new(
        state.repo.clone(),
        state.oauth.clone(),
        state.config.clone(),
    );

    use_case
        .callback(
            provider,
            CallbackParams {
                code: query.code,
                state: query.state,
                error: query.error,
            },
        )
        .await
}

fn oauth_state_key(state: &str) -> String {
    format!("oauth:state:{}", state)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn extract_session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    platform::cookie::extract_cookie(headers, name)
}

/// Build the session Set-Cookie value; Max-Age only for persistent sessions
fn session_cookie(config: &AuthConfig, token: &str, persistent: bool) -> String {
    let max_age = persistent.then(|| config.session_ttl_persistent.as_secs());
    config.cookie_config().build_set_cookie(token, max_age)
}

async fn current_user<R>(
    state: &AuthAppState<R>,
    headers: &HeaderMap,
) -> AuthResult<Option<User>>
where
    R: AuthRepository,
{
    let Some(token) = extract_session_cookie(headers, &state.config.session_cookie_name) else {
        return Ok(None);
    };

    let sessions = SessionService::new(state.repo.clone(), state.config.clone());
    sessions.current_user(&token).await
}

async fn require_user<R>(state: &AuthAppState<R>, headers: &HeaderMap) -> AuthResult<User>
where
    R: AuthRepository,
{
    current_user(state, headers)
        .await?
        .ok_or(AuthError::SessionInvalid)
}

fn user_info(user: User) -> UserInfoResponse {
    UserInfoResponse {
        user_id: user.user_id.to_string(),
        email: user.email.to_string(),
        name: user.name,
        role: user.role.code().to_string(),
        email_verified: user.email_verified,
        two_factor_enabled: user.two_factor_enabled,
        two_factor_method: user.two_factor_method,
    }
}

fn redirect(location: &str) -> Response {
    match header::HeaderValue::from_str(location) {
        Ok(value) => {
            (StatusCode::TEMPORARY_REDIRECT, [(header::LOCATION, value)]).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
