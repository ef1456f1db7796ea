//! Node identities and identity-to-agreement key conversion.
//!
//! A kindred node is identified by an Ed25519 signing keypair. The handshake
//! does not sign anything; instead the identity keypair is mapped onto the
//! Montgomery curve so the same long-term key can be used for X25519 key
//! agreement and anonymous sealing:
//!
//! - public half: Edwards point `A` is mapped to its Montgomery `u`-coordinate
//! - secret half: the clamped scalar `SHA-512(seed)[..32]` is used directly
//!
//! Because the Ed25519 public key is `a·B` for that same scalar `a`, the
//! converted public key always equals `X25519(a, 9)`.
//!
//! # Example
//!
//! ```
//! use kindred_crypto::identity::Identity;
//! use rand_core::OsRng;
//!
//! let alice = Identity::generate(&mut OsRng);
//! let bob = Identity::generate(&mut OsRng);
//!
//! let bob_auth = bob.public_identity().auth_public_key().unwrap();
//! let alice_auth = alice.public_identity().auth_public_key().unwrap();
//!
//! let ab = alice.auth_keypair().agree(&bob_auth).unwrap();
//! let ba = bob.auth_keypair().agree(&alice_auth).unwrap();
//! assert_eq!(ab.as_bytes(), ba.as_bytes());
//! ```

use crate::CryptoError;
use crate::x25519::{PrivateKey, PublicKey, SharedSecret};
use curve25519_dalek::edwards::CompressedEdwardsY;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Size of an identity public key (Ed25519).
pub const IDENTITY_PUBLIC_KEY_SIZE: usize = 32;

/// Size of an identity secret key (Ed25519 seed followed by the public key).
pub const IDENTITY_SECRET_KEY_SIZE: usize = 64;

/// Map an identity (Ed25519) public key to its agreement (X25519) public key.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the input is not 32 bytes, or
/// [`CryptoError::InvalidPublicKey`] if it is not a valid Edwards point.
pub fn derive_auth_public_key(identity_public_key: &[u8]) -> Result<PublicKey, CryptoError> {
    let bytes: [u8; IDENTITY_PUBLIC_KEY_SIZE] =
        identity_public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: IDENTITY_PUBLIC_KEY_SIZE,
                actual: identity_public_key.len(),
            })?;

    let point = CompressedEdwardsY(bytes)
        .decompress()
        .ok_or(CryptoError::InvalidPublicKey)?;

    Ok(PublicKey::from_bytes(point.to_montgomery().to_bytes()))
}

/// Map an identity (Ed25519) secret key to its agreement (X25519) secret key.
///
/// Accepts the 64-byte `seed ++ public` layout. Only the seed is read; the
/// conversion hashes it and never branches on its content.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyLength`] if the input is not 64 bytes.
pub fn derive_auth_secret_key(identity_secret_key: &[u8]) -> Result<PrivateKey, CryptoError> {
    if identity_secret_key.len() != IDENTITY_SECRET_KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: IDENTITY_SECRET_KEY_SIZE,
            actual: identity_secret_key.len(),
        });
    }

    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&identity_secret_key[..32]);

    let signing = ed25519_dalek::SigningKey::from_bytes(&seed);
    let scalar = Zeroizing::new(signing.to_scalar_bytes());
    Ok(PrivateKey::from_bytes(*scalar))
}

/// Public half of an identity: a validated 32-byte Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicIdentity([u8; IDENTITY_PUBLIC_KEY_SIZE]);

impl PublicIdentity {
    /// Create from raw bytes, checking that they encode a curve point.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes are not a valid
    /// Ed25519 public key.
    pub fn from_bytes(bytes: [u8; IDENTITY_PUBLIC_KEY_SIZE]) -> Result<Self, CryptoError> {
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }

    /// Create from a slice.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyLength`] for a slice that is not 32
    /// bytes, or [`CryptoError::InvalidPublicKey`] for an invalid point.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; IDENTITY_PUBLIC_KEY_SIZE] =
            slice.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: IDENTITY_PUBLIC_KEY_SIZE,
                actual: slice.len(),
            })?;
        Self::from_bytes(bytes)
    }

    /// Parse from a 64-character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHex`] for malformed hex, otherwise the
    /// errors of [`PublicIdentity::from_slice`].
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Copy of the raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IDENTITY_PUBLIC_KEY_SIZE] {
        self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// The X25519 public key this identity agrees with.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the point cannot be mapped.
    pub fn auth_public_key(&self) -> Result<PublicKey, CryptoError> {
        derive_auth_public_key(&self.0)
    }
}

impl fmt::Display for PublicIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicIdentity({})", self.short())
    }
}

impl FromStr for PublicIdentity {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// X25519 keypair derived from an [`Identity`].
///
/// Recomputed whenever it is needed and never persisted on its own.
#[derive(Clone, Debug)]
pub struct AuthKeypair {
    public: PublicKey,
    secret: PrivateKey,
}

impl AuthKeypair {
    /// Agreement public key.
    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Agreement secret key.
    #[must_use]
    pub fn secret_key(&self) -> &PrivateKey {
        &self.secret
    }

    /// Compute the shared secret with a remote agreement public key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] for low-order remote keys.
    pub fn agree(&self, remote: &PublicKey) -> Result<SharedSecret, CryptoError> {
        self.secret.exchange(remote)
    }
}

/// Long-term node identity (Ed25519 signing keypair).
#[derive(Clone)]
pub struct Identity {
    signing: ed25519_dalek::SigningKey,
}

impl Identity {
    /// Generate a fresh random identity.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::generate(rng),
        }
    }

    /// Restore from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    /// Restore from the 64-byte `seed ++ public` layout.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::KeypairMismatch`] if the public half does not
    /// belong to the seed.
    pub fn from_keypair_bytes(bytes: &[u8; IDENTITY_SECRET_KEY_SIZE]) -> Result<Self, CryptoError> {
        let signing = ed25519_dalek::SigningKey::from_keypair_bytes(bytes)
            .map_err(|_| CryptoError::KeypairMismatch)?;
        Ok(Self { signing })
    }

    /// Export the 64-byte `seed ++ public` secret key.
    #[must_use]
    pub fn to_keypair_bytes(&self) -> Zeroizing<[u8; IDENTITY_SECRET_KEY_SIZE]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    /// Public half of this identity.
    #[must_use]
    pub fn public_identity(&self) -> PublicIdentity {
        PublicIdentity(self.signing.verifying_key().to_bytes())
    }

    /// Agreement keypair for this identity.
    #[must_use]
    pub fn auth_keypair(&self) -> AuthKeypair {
        let scalar = Zeroizing::new(self.signing.to_scalar_bytes());
        let secret = PrivateKey::from_bytes(*scalar);
        AuthKeypair {
            public: secret.public_key(),
            secret,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("public", &self.public_identity())
            .finish_non_exhaustive()
    }
}
