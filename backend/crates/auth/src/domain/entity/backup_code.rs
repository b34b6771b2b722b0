//! Backup Code Entity
//!
//! One-time recovery credential substituting for the primary second factor.
//! Codes are stored as SHA-256 digests of the uppercased form; comparison is
//! case-insensitive and a code verifies at most once.

use chrono::{DateTime, Utc};
use platform::crypto::sha256_hex;

use crate::domain::value_object::user_id::UserId;

/// Normalize a candidate code before hashing or comparison
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Digest of a normalized backup code
pub fn hash_code(code: &str) -> String {
    sha256_hex(normalize_code(code).as_bytes())
}

/// One-time-use recovery code
#[derive(Debug, Clone)]
pub struct BackupCode {
    /// Owning user
    pub user_id: UserId,
    /// SHA-256 hex digest of the uppercased code
    pub code_hash: String,
    /// Flipped on first successful match; a used code never verifies again
    pub used: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl BackupCode {
    /// Create from a clear-text code
    pub fn new(user_id: UserId, code: &str) -> Self {
        Self {
            user_id,
            code_hash: hash_code(code),
            used: false,
            created_at: Utc::now(),
        }
    }

    /// Whether `candidate` matches this (still unused) code
    pub fn matches(&self, candidate: &str) -> bool {
        !self.used && self.code_hash == hash_code(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_case_insensitive() {
        let code = BackupCode::new(UserId::new(), "ABCD-2345");
        assert!(code.matches("ABCD-2345"));
        assert!(code.matches("abcd-2345"));
        assert!(code.matches("  abcd-2345  "));
        assert!(!code.matches("ABCD-2346"));
    }

    #[test]
    fn test_used_code_never_matches() {
        let mut code = BackupCode::new(UserId::new(), "ABCD-2345");
        code.used = true;
        assert!(!code.matches("ABCD-2345"));
    }

    #[test]
    fn test_stored_form_is_a_digest() {
        let code = BackupCode::new(UserId::new(), "abcd-2345");
        assert_ne!(code.code_hash, "abcd-2345");
        assert_eq!(code.code_hash, hash_code("ABCD-2345"));
    }
}
