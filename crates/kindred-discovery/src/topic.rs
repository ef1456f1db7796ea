//! Discovery topic derivation.
//!
//! A node listens on the topic derived from its own identity and dials a
//! friend by joining the topic derived from the friend's identity. Anyone
//! who knows an identity can compute its topic, but the topic alone does not
//! reveal the identity it was derived from.

use kindred_crypto::PublicIdentity;
use kindred_crypto::hash::keyed_hash;
use std::fmt;

/// Application salt mixed into every friend discovery topic.
///
/// Not used by any other BLAKE3 computation in kindred.
pub const FRIEND_DISCOVERY_SALT: &[u8] = b"kindred/friendswarm/v1";

/// Size of a discovery topic in bytes.
pub const TOPIC_SIZE: usize = 32;

/// Public rendezvous identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic([u8; TOPIC_SIZE]);

impl Topic {
    /// Wrap raw topic bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; TOPIC_SIZE]) -> Self {
        Self(bytes)
    }

    /// Derive the friend discovery topic of an identity.
    #[must_use]
    pub fn for_identity(identity: &PublicIdentity) -> Self {
        Self(keyed_hash(identity.as_bytes(), FRIEND_DISCOVERY_SALT))
    }

    /// Raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; TOPIC_SIZE] {
        &self.0
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
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.short())
    }
}

/// Derive the friend discovery topic of an identity.
#[must_use]
pub fn topic_for(identity: &PublicIdentity) -> Topic {
    Topic::for_identity(identity)
}
