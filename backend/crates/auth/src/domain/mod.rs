//! Domain Layer
//!
//! Contains entities, value objects, and repository traits.

pub mod entity;
pub mod repository;
pub mod value_object;

// Re-exports
pub use entity::{
    backup_code::BackupCode, linked_account::LinkedAccount,
    password_history::PasswordHistoryEntry, session::Session, user::User,
};
pub use repository::{
    AuthRepository, BackupCodeRepository, LinkedAccountRepository, PasswordHistoryRepository,
    SessionRepository, UserRepository,
};
