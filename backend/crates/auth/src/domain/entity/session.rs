//! Session Entity
//!
//! Server-side mirror of a signed session token. Deleting the row revokes
//! the session before its cryptographic expiry; the Session Manager is the
//! only component that consults this record.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::value_object::user_id::UserId;

/// Authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID (UUID v4), embedded in the signed token
    pub session_id: Uuid,
    /// Owning user
    pub user_id: UserId,
    /// Whether this is a long-lived "remember me" session
    pub persistent: bool,
    /// Session expiration (Unix timestamp ms)
    pub expires_at_ms: i64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session
    ///
    /// TTL is provided by the application layer (config), not hard-coded here.
    pub fn new(user_id: UserId, persistent: bool, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            persistent,
            expires_at_ms: (now + ttl).timestamp_millis(),
            created_at: now,
        }
    }

    /// Check if session has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() > self.expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_is_not_expired() {
        let session = Session::new(UserId::new(), false, Duration::hours(24));
        assert!(!session.is_expired());
    }

    #[test]
    fn test_past_ttl_session_is_expired() {
        let session = Session::new(UserId::new(), false, Duration::seconds(-1));
        assert!(session.is_expired());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = Session::new(UserId::new(), true, Duration::hours(1));
        let b = Session::new(UserId::new(), true, Duration::hours(1));
        assert_ne!(a.session_id, b.session_id);
    }
}
