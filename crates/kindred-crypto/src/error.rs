//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Message shorter than the fixed overhead of its format
    #[error("message too short: need at least {minimum} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum acceptable length
        minimum: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,

    /// Invalid public key (not a curve point, or low order)
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Secret half of a keypair does not match its public half
    #[error("keypair mismatch: secret key does not produce the given public key")]
    KeypairMismatch,

    /// Invalid hex encoding
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}
