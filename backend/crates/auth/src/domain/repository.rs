//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the
//! infrastructure layer (Postgres for production, in-memory for tests).

use uuid::Uuid;

use crate::domain::entity::{
    backup_code::BackupCode, linked_account::LinkedAccount,
    password_history::PasswordHistoryEntry, session::Session, user::User,
};
use crate::domain::value_object::{email::Email, user_id::UserId};
use crate::error::AuthResult;

/// User repository trait
#[trait_variant::make(UserRepository: Send)]
pub trait LocalUserRepository {
    /// Create a new user
    async fn create_user(&self, user: &User) -> AuthResult<()>;

    /// Find user by ID
    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>>;

    /// Find user by email
    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>>;

    /// Check if an email is taken
    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool>;

    /// Update user (last-writer-wins on the row)
    async fn update_user(&self, user: &User) -> AuthResult<()>;
}

/// Linked account (external identity) repository trait
#[trait_variant::make(LinkedAccountRepository: Send)]
pub trait LocalLinkedAccountRepository {
    /// Create a link; (provider, provider_id) is unique
    async fn create_link(&self, link: &LinkedAccount) -> AuthResult<()>;

    /// Find a link by (provider, provider_id)
    async fn find_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> AuthResult<Option<LinkedAccount>>;
}

/// Password history repository trait
#[trait_variant::make(PasswordHistoryRepository: Send)]
pub trait LocalPasswordHistoryRepository {
    /// Append an entry; prior entries are never touched
    async fn append_history(&self, entry: &PasswordHistoryEntry) -> AuthResult<()>;

    /// All history entries for a user
    async fn history_for_user(&self, user_id: &UserId) -> AuthResult<Vec<PasswordHistoryEntry>>;
}

/// Backup code repository trait
#[trait_variant::make(BackupCodeRepository: Send)]
pub trait LocalBackupCodeRepository {
    /// Replace the user's whole batch: delete-all-then-insert-all, atomic
    /// from the caller's perspective
    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        codes: &[BackupCode],
    ) -> AuthResult<()>;

    /// Consume the unused code matching `code_hash`, if any
    ///
    /// The match and the `used` flip are one atomic step; a consumed code
    /// never matches again.
    async fn consume_backup_code(&self, user_id: &UserId, code_hash: &str) -> AuthResult<bool>;

    /// Delete all codes for a user
    async fn delete_backup_codes(&self, user_id: &UserId) -> AuthResult<()>;
}

/// The full persistence surface the presentation layer wires together
pub trait AuthRepository:
    UserRepository
    + LinkedAccountRepository
    + PasswordHistoryRepository
    + BackupCodeRepository
    + SessionRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> AuthRepository for T where
    T: UserRepository
        + LinkedAccountRepository
        + PasswordHistoryRepository
        + BackupCodeRepository
        + SessionRepository
        + Send
        + Sync
        + 'static
{
}

/// Session repository trait
#[trait_variant::make(SessionRepository: Send)]
pub trait LocalSessionRepository {
    /// Persist a new session
    async fn create_session(&self, session: &Session) -> AuthResult<()>;

    /// Find a session by ID
    async fn find_session(&self, session_id: Uuid) -> AuthResult<Option<Session>>;

    /// Delete a session (server-side revocation)
    async fn delete_session(&self, session_id: Uuid) -> AuthResult<()>;

    /// Delete all sessions for a user, returning how many were removed
    async fn delete_sessions_for_user(&self, user_id: &UserId) -> AuthResult<u64>;

    /// Remove expired sessions
    async fn cleanup_expired_sessions(&self) -> AuthResult<u64>;
}
