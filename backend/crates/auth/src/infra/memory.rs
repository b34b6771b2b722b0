//! In-Memory Repository Implementation
//!
//! Deterministic store backing the tests (and useful for local experiments).
//! A single mutex per collection keeps the consume/replace operations atomic
//! the same way the SQL statements are.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use uuid::Uuid;

use crate::domain::entity::{
    backup_code::BackupCode, linked_account::LinkedAccount,
    password_history::PasswordHistoryEntry, session::Session, user::User,
};
use crate::domain::repository::{
    BackupCodeRepository, LinkedAccountRepository, PasswordHistoryRepository, SessionRepository,
    UserRepository,
};
use crate::domain::value_object::{email::Email, user_id::UserId};
use crate::error::{AuthError, AuthResult};

/// In-memory auth repository
#[derive(Default)]
pub struct MemoryAuthRepository {
    users: Mutex<HashMap<Uuid, User>>,
    links: Mutex<HashMap<(String, String), LinkedAccount>>,
    history: Mutex<Vec<PasswordHistoryEntry>>,
    codes: Mutex<Vec<BackupCode>>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    /// When set, history reads fail; exercises the fail-closed policy
    history_failing: AtomicBool,
}

impl MemoryAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `history_for_user` fail until reset (store-outage simulation)
    pub fn set_history_failing(&self, failing: bool) {
        self.history_failing.store(failing, Ordering::SeqCst);
    }

    /// Count of unused backup codes for a user
    pub fn unused_code_count(&self, user_id: &UserId) -> usize {
        self.codes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.user_id == *user_id && !c.used)
            .count()
    }
}

impl UserRepository for MemoryAuthRepository {
    async fn create_user(&self, user: &User) -> AuthResult<()> {
        let mut users = self.users.lock().unwrap();
        if users
            .values()
            .any(|u| u.email.as_str() == user.email.as_str())
        {
            // Mirrors the unique constraint on (email)
            return Err(AuthError::EmailTaken);
        }
        users.insert(user.user_id.as_uuid(), user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&user_id.as_uuid()).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email.as_str() == email.as_str())
            .cloned())
    }

    async fn exists_by_email(&self, email: &Email) -> AuthResult<bool> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .any(|u| u.email.as_str() == email.as_str()))
    }

    async fn update_user(&self, user: &User) -> AuthResult<()> {
        self.users
            .lock()
            .unwrap()
            .insert(user.user_id.as_uuid(), user.clone());
        Ok(())
    }
}

impl LinkedAccountRepository for MemoryAuthRepository {
    async fn create_link(&self, link: &LinkedAccount) -> AuthResult<()> {
        let key = (link.provider.clone(), link.provider_id.clone());
        let mut links = self.links.lock().unwrap();
        if links.contains_key(&key) {
            return Err(AuthError::Internal(
                "Duplicate (provider, provider_id)".to_string(),
            ));
        }
        links.insert(key, link.clone());
        Ok(())
    }

    async fn find_link(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> AuthResult<Option<LinkedAccount>> {
        Ok(self
            .links
            .lock()
            .unwrap()
            .get(&(provider.to_string(), provider_id.to_string()))
            .cloned())
    }
}

impl PasswordHistoryRepository for MemoryAuthRepository {
    async fn append_history(&self, entry: &PasswordHistoryEntry) -> AuthResult<()> {
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn history_for_user(&self, user_id: &UserId) -> AuthResult<Vec<PasswordHistoryEntry>> {
        if self.history_failing.load(Ordering::SeqCst) {
            return Err(AuthError::Internal("History store unavailable".to_string()));
        }
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == *user_id)
            .cloned()
            .collect())
    }
}

impl BackupCodeRepository for MemoryAuthRepository {
    async fn replace_backup_codes(
        &self,
        user_id: &UserId,
        codes: &[BackupCode],
    ) -> AuthResult<()> {
        // Delete and insert under one lock: no observable intermediate state
        let mut all = self.codes.lock().unwrap();
        all.retain(|c| c.user_id != *user_id);
        all.extend_from_slice(codes);
        Ok(())
    }

    async fn consume_backup_code(&self, user_id: &UserId, code_hash: &str) -> AuthResult<bool> {
        let mut all = self.codes.lock().unwrap();
        match all
            .iter_mut()
            .find(|c| c.user_id == *user_id && c.code_hash == code_hash && !c.used)
        {
            Some(code) => {
                code.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_backup_codes(&self, user_id: &UserId) -> AuthResult<()> {
        self.codes.lock().unwrap().retain(|c| c.user_id != *user_id);
        Ok(())
    }
}

impl SessionRepository for MemoryAuthRepository {
    async fn create_session(&self, session: &Session) -> AuthResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id, session.clone());
        Ok(())
    }

    async fn find_session(&self, session_id: Uuid) -> AuthResult<Option<Session>> {
        Ok(self.sessions.lock().unwrap().get(&session_id).cloned())
    }

    async fn delete_session(&self, session_id: Uuid) -> AuthResult<()> {
        self.sessions.lock().unwrap().remove(&session_id);
        Ok(())
    }

    async fn delete_sessions_for_user(&self, user_id: &UserId) -> AuthResult<u64> {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.user_id != *user_id);
        Ok((before - sessions.len()) as u64)
    }

    async fn cleanup_expired_sessions(&self) -> AuthResult<u64> {
        let now_ms = Utc::now().timestamp_millis();
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at_ms >= now_ms);
        Ok((before - sessions.len()) as u64)
    }
}
