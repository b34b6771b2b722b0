//! Cryptographic Utilities
//!
//! Random material generation and digest helpers shared by the auth core.

use base64::{Engine, engine::general_purpose};
use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Alphabet for backup codes: uppercase alphanumerics minus the
/// ambiguous glyphs (0/O, 1/I/L).
const BACKUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate cryptographically secure random bytes
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Generate a random numeric one-time code of exactly `digits` digits
///
/// Leading zeros are preserved ("042713" is a valid 6-digit code).
pub fn random_numeric_code(digits: u32) -> String {
    let bound = 10u32.pow(digits);
    let code: u32 = OsRng.gen_range(0..bound);
    format!("{:0width$}", code, width = digits as usize)
}

/// Generate a single backup code in `XXXX-XXXX` form
pub fn random_backup_code() -> String {
    let mut chars = Vec::with_capacity(9);
    for i in 0..8 {
        if i == 4 {
            chars.push(b'-');
        }
        let idx = OsRng.gen_range(0..BACKUP_CODE_ALPHABET.len());
        chars.push(BACKUP_CODE_ALPHABET[idx]);
    }
    String::from_utf8(chars).expect("alphabet is ASCII")
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute SHA-256 and return lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    sha256(data).iter().map(|b| format!("{:02x}", b)).collect()
}

/// Encode bytes as URL-safe base64 without padding
pub fn to_base64_url(bytes: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode URL-safe unpadded base64 to bytes
pub fn from_base64_url(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    general_purpose::URL_SAFE_NO_PAD.decode(s)
}

/// Constant-time comparison to prevent timing attacks
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes() {
        let bytes = random_bytes(32);
        assert_eq!(bytes.len(), 32);
        // Should not be all zeros (statistically)
        assert!(bytes.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_numeric_code_shape() {
        for _ in 0..100 {
            let code = random_numeric_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_numeric_code_randomness() {
        use std::collections::HashSet;
        let codes: HashSet<String> = (0..100).map(|_| random_numeric_code(6)).collect();
        assert!(codes.len() > 95, "Should generate mostly unique codes");
    }

    #[test]
    fn test_backup_code_shape() {
        for _ in 0..50 {
            let code = random_backup_code();
            assert_eq!(code.len(), 9);
            assert_eq!(code.as_bytes()[4], b'-');
            assert!(
                code.bytes()
                    .all(|b| b == b'-' || BACKUP_CODE_ALPHABET.contains(&b))
            );
        }
    }

    #[test]
    fn test_sha256_known_values() {
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.to_vec(), expected);

        assert_eq!(
            sha256_hex(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_base64_url_roundtrip() {
        let data = b"hello world";
        let encoded = to_base64_url(data);
        assert!(!encoded.contains('='));
        let decoded = from_base64_url(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(&[1, 2, 3, 4], &[1, 2, 3, 4]));
        assert!(!constant_time_eq(&[1, 2, 3, 4], &[1, 2, 3, 5]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 3, 4]));
    }
}
