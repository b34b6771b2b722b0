//! Infrastructure Layer
//!
//! Database implementations and external service integrations.

pub mod memory;
pub mod oauth_http;
pub mod postgres;

pub use memory::MemoryAuthRepository;
pub use oauth_http::HttpIdentityProviderClient;
pub use postgres::PgAuthRepository;
