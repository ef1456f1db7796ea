//! BLAKE3 hashing and key derivation.
//!
//! Provides:
//! - Plain and keyed hashing
//! - Context-separated key derivation ([`Kdf`])
//!
//! Each use of BLAKE3 in kindred has its own context string or key so that
//! outputs from one use can never be replayed as inputs of another.

/// BLAKE3 hash output (32 bytes).
pub type HashOutput = [u8; 32];

/// Compute BLAKE3 hash of input data.
#[must_use]
pub fn hash(data: &[u8]) -> HashOutput {
    *blake3::hash(data).as_bytes()
}

/// Compute BLAKE3 hash of several inputs, as if concatenated.
#[must_use]
pub fn hash_parts(parts: &[&[u8]]) -> HashOutput {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Compute keyed BLAKE3 (a MAC/PRF) of `data` under a 32-byte `key`.
#[must_use]
pub fn keyed_hash(key: &[u8; 32], data: &[u8]) -> HashOutput {
    *blake3::keyed_hash(key, data).as_bytes()
}

/// BLAKE3 key derivation with a fixed context string.
///
/// ```
/// use kindred_crypto::hash::Kdf;
///
/// let kdf = Kdf::new("kindred 2024 example key");
/// assert_eq!(kdf.derive_key(b"ikm"), kdf.derive_key(b"ikm"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Kdf {
    context: &'static str,
}

impl Kdf {
    /// Create a KDF with a specific context string.
    #[must_use]
    pub const fn new(context: &'static str) -> Self {
        Self { context }
    }

    /// Derive a 32-byte key from input key material.
    #[must_use]
    pub fn derive_key(&self, ikm: &[u8]) -> [u8; 32] {
        blake3::derive_key(self.context, ikm)
    }

    /// Derive a 32-byte key from several pieces of input key material.
    #[must_use]
    pub fn derive_key_parts(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(self.context);
        for part in parts {
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }

    /// The context string of this KDF.
    #[must_use]
    pub fn context(&self) -> &'static str {
        self.context
    }
}
