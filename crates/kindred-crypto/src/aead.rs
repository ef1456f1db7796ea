//! `XChaCha20-Poly1305` AEAD encryption.
//!
//! Every handshake message that carries a secret is encrypted with a fresh
//! random 192-bit nonce, so random nonce generation is safe for the lifetime
//! of a key (birthday bound is 2^96 messages).
//!
//! ## Wire format
//!
//! The "prefixed" helpers produce and consume the layout used on the wire:
//!
//! ```text
//! +----------------+---------------------------+--------------+
//! | Nonce (24B)    | Ciphertext (len(pt))      | Tag (16B)    |
//! +----------------+---------------------------+--------------+
//! ```
//!
//! ## Usage
//!
//! ```
//! use kindred_crypto::aead::AeadKey;
//!
//! let key = AeadKey::new([7u8; 32]);
//! let message = key.encrypt_prefixed(b"challenge", b"").unwrap();
//! assert_eq!(key.decrypt_prefixed(&message, b"").unwrap(), b"challenge");
//! ```

use crate::CryptoError;
use chacha20poly1305::{
    XChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use rand_core::{CryptoRng, RngCore};
use zeroize::ZeroizeOnDrop;

/// Authentication tag size (16 bytes / 128 bits).
pub const TAG_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size (24 bytes / 192 bits).
pub const NONCE_SIZE: usize = 24;

/// AEAD key size (32 bytes / 256 bits).
pub const KEY_SIZE: usize = 32;

/// Overhead added by [`AeadKey::encrypt_prefixed`]: nonce plus tag.
pub const PREFIXED_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// XChaCha20-Poly1305 nonce (24 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create a nonce from a slice.
    #[must_use]
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Generate a random nonce.
    #[must_use]
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Generate a random nonce from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::RandomFailed`] if the OS CSPRNG fails.
    pub fn random() -> Result<Self, CryptoError> {
        crate::random::random_24().map(Self)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    fn as_generic(&self) -> &chacha20poly1305::XNonce {
        chacha20poly1305::XNonce::from_slice(&self.0)
    }
}

/// AEAD encryption key (32 bytes).
///
/// Key is zeroized on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AeadKey([u8; KEY_SIZE]);

impl AeadKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] =
            slice
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: slice.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Encrypt plaintext with associated data.
    ///
    /// Returns ciphertext with appended authentication tag (`plaintext.len()` + 16 bytes).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = XChaCha20Poly1305::new((&self.0).into());

        cipher
            .encrypt(
                nonce.as_generic(),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Decrypt ciphertext with associated data.
    ///
    /// Input must include the authentication tag at the end.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on authentication failure or
    /// when the input is shorter than a tag.
    pub fn decrypt(
        &self,
        nonce: &Nonce,
        ciphertext_and_tag: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let cipher = XChaCha20Poly1305::new((&self.0).into());

        cipher
            .decrypt(
                nonce.as_generic(),
                Payload {
                    msg: ciphertext_and_tag,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Encrypt under a fresh random nonce and return `nonce ++ ciphertext ++ tag`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if no nonce could be drawn, or
    /// `CryptoError::EncryptionFailed` if AEAD encryption fails.
    pub fn encrypt_prefixed(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::random()?;
        let ciphertext = self.encrypt(&nonce, plaintext, aad)?;

        let mut message = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        message.extend_from_slice(nonce.as_bytes());
        message.extend_from_slice(&ciphertext);
        Ok(message)
    }

    /// Split a `nonce ++ ciphertext ++ tag` message and decrypt it.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MessageTooShort` if the message cannot hold a
    /// nonce and a tag, or `CryptoError::DecryptionFailed` on authentication
    /// failure.
    pub fn decrypt_prefixed(&self, message: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if message.len() < PREFIXED_OVERHEAD {
            return Err(CryptoError::MessageTooShort {
                minimum: PREFIXED_OVERHEAD,
                actual: message.len(),
            });
        }

        let (nonce_bytes, ciphertext) = message.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes).ok_or(CryptoError::DecryptionFailed)?;
        self.decrypt(&nonce, ciphertext, aad)
    }
}
