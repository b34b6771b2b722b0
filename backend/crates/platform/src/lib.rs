//! Platform Crate - Technical Infrastructure
//!
//! This crate provides shared technical foundations with no domain logic:
//! - Cryptographic utilities (random material, one-time codes, digests)
//! - Password hashing (Argon2id, NIST SP 800-63B compliant)
//! - Cookie management
//! - Transient key-value storage with TTL semantics
//! - Outbound email dispatch

pub mod cookie;
pub mod crypto;
pub mod kv;
pub mod mail;
pub mod password;
