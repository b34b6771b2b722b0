//! Auth (Authentication) Backend Module
//!
//! Clean Architecture structure:
//! - `domain/` - Business logic, entities, repository traits
//! - `application/` - Use cases and application services
//! - `infra/` - Database implementations and provider clients
//! - `presentation/` - HTTP handlers, DTOs, router, edge gate
//!
//! ## Features
//! - Email + password accounts with mandatory email verification
//! - Two-factor authentication: TOTP, email one-time codes, backup codes
//! - OAuth sign-in with account linking by provider-verified email
//! - HMAC-signed session tokens mirrored server-side for revocation
//! - Purpose-bound tokens (verification, reset) with server-side mirrors
//!
//! ## Security Model
//! - Passwords hashed with Argon2id; reuse blocked against full history
//! - Login-adjacent failures are undifferentiated to the caller
//! - Tokens are single-use: consumption clears the server-side mirror
//! - Login challenges and one-time codes are read-once with short TTLs
//! - The edge gate verifies signatures only and never touches a store

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use application::config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use infra::postgres::PgAuthRepository;
pub use presentation::router::auth_router;

// Convenience re-exports
pub mod config {
    pub use crate::application::config::*;
}

pub mod models {
    pub use crate::domain::entity::*;
    pub use crate::domain::value_object::*;
    pub use crate::presentation::dto::*;
}

pub mod handlers {
    pub use crate::presentation::handlers::*;
}

pub mod store {
    pub use crate::infra::memory::MemoryAuthRepository;
    pub use crate::infra::postgres::PgAuthRepository as AuthStore;
}

pub mod router {
    pub use crate::presentation::router::*;
}

pub mod gate {
    pub use crate::presentation::gate::*;
}
