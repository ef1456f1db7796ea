//! Challenge-response mutual authentication.
//!
//! The handshake runs over one rendezvous stream between a **Responder**
//! (the node being looked up, "host") and an **Initiator** (the node that
//! knows the host's identity and wants to reach it):
//!
//! ```text
//! Initiator                                   Responder
//!     |  seal(initiator identity, host auth key)  |
//!     |------------------------------------------>|  AwaitingRequest
//!     |       nonce ++ E(K, challenge)            |
//!     |<------------------------------------------|  ChallengeSent
//!     |       nonce' ++ E(K, challenge)           |
//!     |------------------------------------------>|  Verifying
//!     |            "chat-auth-success"            |
//!     |<------------------------------------------|  Authenticated
//! ```
//!
//! `K` is derived from the X25519 shared secret between the two identities'
//! agreement keys. Only a party holding the secret key of the identity it
//! claimed can decrypt the challenge and echo it back under `K`. The two
//! directions carry different associated data, so reflecting the challenge
//! message back to the Responder does not verify.
//!
//! The engines in [`responder`] and [`initiator`] are pure state machines:
//! they consume one received message at a time and return a [`Transition`]
//! telling the caller what to send. [`driver`] runs them over a
//! [`FrameStream`](crate::framing::FrameStream) with per-step timeouts.

pub mod driver;
pub mod initiator;
pub mod responder;

pub use driver::{initiate, respond};
pub use initiator::{Initiator, InitiatorPhase};
pub use responder::{Responder, ResponderPhase};

use crate::error::HandshakeError;
use kindred_crypto::PublicIdentity;
use kindred_crypto::aead::{AeadKey, NONCE_SIZE, TAG_SIZE};
use kindred_crypto::hash::Kdf;
use kindred_crypto::identity::IDENTITY_PUBLIC_KEY_SIZE;
use kindred_crypto::seal::SEAL_OVERHEAD;
use kindred_crypto::x25519::SharedSecret;

/// Sent by the Responder once the challenge echo verifies.
pub const SUCCESS_MARKER: &[u8] = b"chat-auth-success";

/// Size of the random challenge.
pub const CHALLENGE_SIZE: usize = 32;

/// Size of a challenge or challenge-response message.
pub const CHALLENGE_MESSAGE_SIZE: usize = NONCE_SIZE + CHALLENGE_SIZE + TAG_SIZE;

/// Size of an authentication request.
pub const AUTH_REQUEST_SIZE: usize = SEAL_OVERHEAD + IDENTITY_PUBLIC_KEY_SIZE;

/// Largest message either engine ever sends.
pub const MAX_HANDSHAKE_MESSAGE: usize = AUTH_REQUEST_SIZE;

/// Associated data of the Responder's challenge message.
pub(crate) const CHALLENGE_AAD: &[u8] = b"kindred handshake challenge";

/// Associated data of the Initiator's challenge response.
pub(crate) const RESPONSE_AAD: &[u8] = b"kindred handshake response";

const CHALLENGE_KDF: Kdf = Kdf::new("kindred 2024-06 handshake challenge key v1");

/// Symmetric key both sides derive from their shared secret.
pub(crate) fn challenge_key(shared: &SharedSecret) -> AeadKey {
    AeadKey::new(CHALLENGE_KDF.derive_key(shared.as_bytes()))
}

/// What the caller should do after feeding a message to an engine.
#[derive(Debug, PartialEq, Eq)]
pub enum Transition {
    /// Input ignored; keep waiting
    Pending,
    /// Send this message, then wait for the next one
    Send(Vec<u8>),
    /// Authenticated. Send `reply` (if any) before handing the stream on.
    Complete {
        /// Final message to send
        reply: Option<Vec<u8>>,
        /// Proven identity of the remote node
        peer: PublicIdentity,
    },
    /// Session rejected; nothing more may be sent
    Rejected(HandshakeError),
}
