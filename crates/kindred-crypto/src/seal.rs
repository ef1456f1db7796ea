//! Anonymous sealed boxes.
//!
//! A sealed box lets anyone who knows a recipient's X25519 public key send
//! it a confidential, integrity-protected message without revealing who sent
//! it. A fresh ephemeral keypair is generated per message and its public half
//! travels in front of the ciphertext:
//!
//! ```text
//! +------------------------+--------------------------+-------------+
//! | Ephemeral public (32B) | Ciphertext (len(msg))    | Tag (16B)   |
//! +------------------------+--------------------------+-------------+
//! ```
//!
//! The AEAD key is derived from the ephemeral DH output and both public keys;
//! the nonce is a hash of the two public keys. Since the ephemeral key is
//! never reused, neither is the (key, nonce) pair.

use crate::CryptoError;
use crate::aead::{AeadKey, NONCE_SIZE, Nonce, TAG_SIZE};
use crate::hash::{Kdf, hash_parts};
use crate::x25519::{PrivateKey, PublicKey};
use rand_core::OsRng;

/// Bytes a sealed box adds on top of its plaintext.
pub const SEAL_OVERHEAD: usize = 32 + TAG_SIZE;

const SEAL_KDF: Kdf = Kdf::new("kindred 2024-06 sealed box key v1");

fn seal_key(dh: &[u8; 32], ephemeral: &PublicKey, recipient: &PublicKey) -> AeadKey {
    AeadKey::new(SEAL_KDF.derive_key_parts(&[dh, ephemeral.as_bytes(), recipient.as_bytes()]))
}

fn seal_nonce(ephemeral: &PublicKey, recipient: &PublicKey) -> Nonce {
    let digest = hash_parts(&[ephemeral.as_bytes(), recipient.as_bytes()]);
    let mut bytes = [0u8; NONCE_SIZE];
    bytes.copy_from_slice(&digest[..NONCE_SIZE]);
    Nonce::from_bytes(bytes)
}

/// Encrypt `message` so that only the holder of `recipient`'s secret key can read it.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] if `recipient` is a low-order
/// point, or [`CryptoError::EncryptionFailed`] if AEAD encryption fails.
pub fn seal(message: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = PrivateKey::generate(&mut OsRng);
    let ephemeral_public = ephemeral.public_key();
    let dh = ephemeral.exchange(recipient)?;

    let key = seal_key(dh.as_bytes(), &ephemeral_public, recipient);
    let nonce = seal_nonce(&ephemeral_public, recipient);
    let ciphertext = key.encrypt(&nonce, message, b"")?;

    let mut sealed = Vec::with_capacity(SEAL_OVERHEAD + message.len());
    sealed.extend_from_slice(ephemeral_public.as_bytes());
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed box addressed to `recipient`.
///
/// # Errors
///
/// Returns [`CryptoError::MessageTooShort`] if the input is shorter than
/// [`SEAL_OVERHEAD`], [`CryptoError::InvalidPublicKey`] for a low-order
/// ephemeral key, and [`CryptoError::DecryptionFailed`] for anything that
/// does not authenticate.
pub fn open(sealed: &[u8], recipient: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(CryptoError::MessageTooShort {
            minimum: SEAL_OVERHEAD,
            actual: sealed.len(),
        });
    }

    let (ephemeral_bytes, ciphertext) = sealed.split_at(32);
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(ephemeral_bytes);
    let ephemeral_public = PublicKey::from_bytes(ephemeral);

    let recipient_public = recipient.public_key();
    let dh = recipient.exchange(&ephemeral_public)?;

    let key = seal_key(dh.as_bytes(), &ephemeral_public, &recipient_public);
    let nonce = seal_nonce(&ephemeral_public, &recipient_public);
    key.decrypt(&nonce, ciphertext, b"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let recipient = PrivateKey::generate(&mut OsRng);
        let sealed = seal(b"identity key bytes", &recipient.public_key()).unwrap();

        assert_eq!(sealed.len(), SEAL_OVERHEAD + 18);
        assert_eq!(open(&sealed, &recipient).unwrap(), b"identity key bytes");
    }

    #[test]
    fn test_seal_is_randomized() {
        let recipient = PrivateKey::generate(&mut OsRng).public_key();
        let a = seal(b"same", &recipient).unwrap();
        let b = seal(b"same", &recipient).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let recipient = PrivateKey::generate(&mut OsRng);
        let stranger = PrivateKey::generate(&mut OsRng);
        let sealed = seal(b"secret", &recipient.public_key()).unwrap();

        assert_eq!(
            open(&sealed, &stranger).unwrap_err(),
            CryptoError::DecryptionFailed
        );
    }

    #[test]
    fn test_open_rejects_every_flipped_bit() {
        let recipient = PrivateKey::generate(&mut OsRng);
        let sealed = seal(&[5u8; 32], &recipient.public_key()).unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                assert!(open(&tampered, &recipient).is_err(), "byte {byte} bit {bit}");
            }
        }
    }

    #[test]
    fn test_open_short_input() {
        let recipient = PrivateKey::generate(&mut OsRng);
        assert_eq!(
            open(&[0u8; SEAL_OVERHEAD - 1], &recipient).unwrap_err(),
            CryptoError::MessageTooShort {
                minimum: SEAL_OVERHEAD,
                actual: SEAL_OVERHEAD - 1,
            }
        );
    }

    #[test]
    fn test_empty_message() {
        let recipient = PrivateKey::generate(&mut OsRng);
        let sealed = seal(b"", &recipient.public_key()).unwrap();

        assert_eq!(sealed.len(), SEAL_OVERHEAD);
        assert!(open(&sealed, &recipient).unwrap().is_empty());
    }
}
