//! Application Layer
//!
//! Use cases and application services.

pub mod change_password;
pub mod config;
pub mod credentials;
pub mod oauth;
pub mod register;
pub mod reset_password;
pub mod session;
pub mod sign_in;
pub mod token_service;
pub mod two_factor;
pub mod two_factor_sign_in;
pub mod verify_email;

// Re-exports
pub use change_password::ChangePasswordUseCase;
pub use config::{AuthConfig, OAuthProviderConfig};
pub use credentials::{CredentialService, HistoryCheck};
pub use oauth::{CallbackParams, IdentityProviderClient, OAuthIdentity, OAuthSignInUseCase};
pub use register::{RegisterInput, RegisterOutput, RegisterUseCase};
pub use reset_password::ResetPasswordUseCase;
pub use session::{SessionService, SessionTokenClaims, decode_session_token};
pub use sign_in::{SignInInput, SignInOutput, SignInUseCase};
pub use token_service::{IssuedToken, TokenPurpose, TokenService};
pub use two_factor::{
    LoginChallenge, TwoFactorProof, TwoFactorService, TwoFactorSetup,
};
pub use two_factor_sign_in::{
    TwoFactorSignInInput, TwoFactorSignInOutput, TwoFactorSignInUseCase,
};
pub use verify_email::VerifyEmailUseCase;
