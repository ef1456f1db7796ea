//! Responder ("host") side of the handshake.

use super::{
    AUTH_REQUEST_SIZE, CHALLENGE_AAD, CHALLENGE_MESSAGE_SIZE, RESPONSE_AAD, SUCCESS_MARKER,
    Transition, challenge_key,
};
use crate::error::HandshakeError;
use kindred_crypto::aead::AeadKey;
use kindred_crypto::constant_time::verify_32;
use kindred_crypto::identity::IDENTITY_PUBLIC_KEY_SIZE;
use kindred_crypto::random::random_32;
use kindred_crypto::{AuthKeypair, Identity, PublicIdentity, seal};
use std::borrow::Cow;
use tracing::{debug, trace};
use zeroize::Zeroizing;

/// Responder phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderPhase {
    /// Waiting for a sealed authentication request
    AwaitingRequest,
    /// Challenge sent, waiting for the echo
    ChallengeSent,
    /// Comparing the echoed challenge
    Verifying,
    /// Peer proved its identity
    Authenticated,
    /// Peer failed to prove its identity
    Rejected,
}

/// Responder state machine.
///
/// Unparseable input while [`ResponderPhase::AwaitingRequest`] is dropped
/// without changing phase, since unrelated bytes may share the stream. Any
/// failure after the challenge is sent rejects the session for good.
pub struct Responder {
    auth: AuthKeypair,
    phase: ResponderPhase,
    peer: Option<PublicIdentity>,
    key: Option<AeadKey>,
    challenge: Option<Zeroizing<[u8; 32]>>,
}

impl Responder {
    /// Create a responder for a local identity.
    #[must_use]
    pub fn new(identity: &Identity) -> Self {
        Self {
            auth: identity.auth_keypair(),
            phase: ResponderPhase::AwaitingRequest,
            peer: None,
            key: None,
            challenge: None,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> ResponderPhase {
        self.phase
    }

    /// Identity claimed by the peer, once a request has been opened.
    ///
    /// Only proven once the phase is [`ResponderPhase::Authenticated`].
    #[must_use]
    pub fn claimed_peer(&self) -> Option<&PublicIdentity> {
        self.peer.as_ref()
    }

    /// Feed one received message.
    pub fn handle(&mut self, message: &[u8]) -> Transition {
        match self.phase {
            ResponderPhase::AwaitingRequest => self.on_request(message),
            ResponderPhase::ChallengeSent => {
                self.phase = ResponderPhase::Verifying;
                self.on_echo(message)
            }
            ResponderPhase::Verifying | ResponderPhase::Authenticated => Transition::Pending,
            ResponderPhase::Rejected => Transition::Rejected(HandshakeError::MalformedInput(
                Cow::Borrowed("session already rejected"),
            )),
        }
    }

    fn on_request(&mut self, message: &[u8]) -> Transition {
        if message.len() < AUTH_REQUEST_SIZE {
            trace!(len = message.len(), "Ignoring short auth request");
            return Transition::Pending;
        }

        let Ok(plaintext) = seal::open(message, self.auth.secret_key()) else {
            trace!("Ignoring auth request that does not open");
            return Transition::Pending;
        };
        if plaintext.len() != IDENTITY_PUBLIC_KEY_SIZE {
            trace!(len = plaintext.len(), "Ignoring auth request with bad payload");
            return Transition::Pending;
        }
        let Ok(peer) = PublicIdentity::from_slice(&plaintext) else {
            trace!("Ignoring auth request with invalid identity");
            return Transition::Pending;
        };
        let Ok(shared) = peer
            .auth_public_key()
            .and_then(|remote| self.auth.agree(&remote))
        else {
            trace!(peer = %peer.short(), "Ignoring auth request from unusable key");
            return Transition::Pending;
        };

        let key = challenge_key(&shared);
        let challenge = match random_32() {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) => return self.reject(e.into()),
        };
        let message = match key.encrypt_prefixed(challenge.as_slice(), CHALLENGE_AAD) {
            Ok(message) => message,
            Err(e) => return self.reject(e.into()),
        };

        debug!(peer = %peer.short(), "Auth request opened, challenge sent");
        self.peer = Some(peer);
        self.key = Some(key);
        self.challenge = Some(challenge);
        self.phase = ResponderPhase::ChallengeSent;
        Transition::Send(message)
    }

    fn on_echo(&mut self, message: &[u8]) -> Transition {
        let key = self.key.take();
        let challenge = self.challenge.take();
        let (Some(key), Some(challenge), Some(peer)) = (key, challenge, self.peer) else {
            return self.reject(HandshakeError::MalformedInput(Cow::Borrowed(
                "no challenge outstanding",
            )));
        };

        if message.len() != CHALLENGE_MESSAGE_SIZE {
            return self.reject(HandshakeError::MalformedInput(Cow::Owned(format!(
                "challenge response of {} bytes, expected {CHALLENGE_MESSAGE_SIZE}",
                message.len()
            ))));
        }

        let echoed = match key.decrypt_prefixed(message, RESPONSE_AAD) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(e) => return self.reject(e.into()),
        };
        let Ok(echoed) = <&[u8; 32]>::try_from(echoed.as_slice()) else {
            return self.reject(HandshakeError::ChallengeMismatch);
        };

        if !verify_32(echoed, &challenge) {
            return self.reject(HandshakeError::ChallengeMismatch);
        }

        debug!(peer = %peer.short(), "Challenge verified");
        self.phase = ResponderPhase::Authenticated;
        Transition::Complete {
            reply: Some(SUCCESS_MARKER.to_vec()),
            peer,
        }
    }

    fn reject(&mut self, error: HandshakeError) -> Transition {
        debug!("Responder rejected session: {error}");
        self.phase = ResponderPhase::Rejected;
        self.key = None;
        self.challenge = None;
        Transition::Rejected(error)
    }
}
