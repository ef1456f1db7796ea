//! # kindred Crypto
//!
//! Cryptographic primitives for the kindred handshake.
//!
//! This crate provides:
//! - Ed25519 identities and their conversion to X25519 agreement keys
//! - Anonymous sealed boxes (ephemeral X25519 + `XChaCha20-Poly1305`)
//! - `XChaCha20-Poly1305` AEAD with random nonces
//! - BLAKE3 hashing and key derivation
//! - Constant-time comparison and OS randomness
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Security Level |
//! |----------|-----------|----------------|
//! | Identity | Ed25519 | 128-bit |
//! | Key Agreement | X25519 (converted identity keys) | 128-bit |
//! | Sealed Box | X25519 + XChaCha20-Poly1305 | 128-bit |
//! | AEAD | XChaCha20-Poly1305 | 256-bit key |
//! | Hash / KDF | BLAKE3 | 128-bit collision |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod constant_time;
pub mod error;
pub mod hash;
pub mod identity;
pub mod random;
pub mod seal;
pub mod x25519;

pub use error::CryptoError;
pub use identity::{AuthKeypair, Identity, PublicIdentity};
