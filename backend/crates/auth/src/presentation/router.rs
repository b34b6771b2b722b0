//! Auth Router

use axum::{
    Router,
    routing::{get, post},
};

use crate::domain::repository::AuthRepository;
use crate::presentation::handlers::{self, AuthAppState};

/// Create the auth router for any repository implementation
pub fn auth_router<R>(state: AuthAppState<R>) -> Router
where
    R: AuthRepository,
{
    Router::new()
        .route("/register", post(handlers::register::<R>))
        .route("/verify-email", post(handlers::verify_email::<R>))
        .route(
            "/resend-verification",
            post(handlers::resend_verification::<R>),
        )
        .route("/signin", post(handlers::sign_in::<R>))
        .route("/signin/two-factor", post(handlers::two_factor_sign_in::<R>))
        .route("/signout", post(handlers::sign_out::<R>))
        .route("/me", get(handlers::session_status::<R>))
        .route("/password/forgot", post(handlers::forgot_password::<R>))
        .route("/password/reset", post(handlers::reset_password::<R>))
        .route("/password/change", post(handlers::change_password::<R>))
        .route("/2fa/initiate", post(handlers::two_factor_initiate::<R>))
        .route("/2fa/complete", post(handlers::two_factor_complete::<R>))
        .route("/2fa/disable", post(handlers::two_factor_disable::<R>))
        .route(
            "/2fa/backup-codes",
            post(handlers::regenerate_backup_codes::<R>),
        )
        .route("/oauth/{provider}", get(handlers::oauth_start::<R>))
        .route(
            "/oauth/{provider}/callback",
            get(handlers::oauth_callback::<R>),
        )
        .with_state(state)
}
