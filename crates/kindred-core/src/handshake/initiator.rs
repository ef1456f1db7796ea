//! Initiator ("host-seeker") side of the handshake.

use super::{
    CHALLENGE_AAD, CHALLENGE_MESSAGE_SIZE, RESPONSE_AAD, SUCCESS_MARKER, Transition, challenge_key,
};
use crate::error::HandshakeError;
use kindred_crypto::aead::AeadKey;
use kindred_crypto::constant_time::ct_eq;
use kindred_crypto::{Identity, PublicIdentity, seal};
use std::borrow::Cow;
use tracing::debug;
use zeroize::Zeroizing;

/// Initiator phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiatorPhase {
    /// Auth request produced, not yet sent
    RequestSent,
    /// Auth request sent, waiting for the challenge
    AwaitingChallenge,
    /// Challenge echoed, waiting for the success marker
    ResponseSent,
    /// Host accepted the echo
    Authenticated,
    /// Host sent something other than what was expected
    Rejected,
    /// Host did not answer in time
    TimedOut,
}

impl InitiatorPhase {
    /// Whether the handshake is over
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Authenticated | Self::Rejected | Self::TimedOut)
    }
}

/// Initiator state machine.
pub struct Initiator {
    host: PublicIdentity,
    key: AeadKey,
    phase: InitiatorPhase,
}

impl Initiator {
    /// Start a handshake with `host`, returning the engine and the sealed
    /// auth request to transmit.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::CryptoFailure`] if the host identity cannot
    /// be used for key agreement or sealing fails.
    pub fn start(
        identity: &Identity,
        host: PublicIdentity,
    ) -> Result<(Self, Vec<u8>), HandshakeError> {
        let host_auth = host.auth_public_key()?;
        let shared = identity.auth_keypair().agree(&host_auth)?;
        let request = seal::seal(identity.public_identity().as_bytes(), &host_auth)?;

        let initiator = Self {
            host,
            key: challenge_key(&shared),
            phase: InitiatorPhase::RequestSent,
        };
        Ok((initiator, request))
    }

    /// Build an initiator whose claimed identity, sealing key and agreement
    /// key are chosen independently.
    #[cfg(test)]
    pub(crate) fn from_parts(
        claimed: &PublicIdentity,
        auth: &kindred_crypto::AuthKeypair,
        host: PublicIdentity,
        agree_with: &kindred_crypto::x25519::PublicKey,
    ) -> (Self, Vec<u8>) {
        let host_auth = host.auth_public_key().unwrap();
        let shared = auth.agree(agree_with).unwrap();
        let request = seal::seal(claimed.as_bytes(), &host_auth).unwrap();
        let initiator = Self {
            host,
            key: challenge_key(&shared),
            phase: InitiatorPhase::RequestSent,
        };
        (initiator, request)
    }

    /// Host this initiator is authenticating.
    #[must_use]
    pub fn host(&self) -> &PublicIdentity {
        &self.host
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> InitiatorPhase {
        self.phase
    }

    /// Record that the auth request has been written.
    pub fn request_sent(&mut self) {
        if self.phase == InitiatorPhase::RequestSent {
            self.phase = InitiatorPhase::AwaitingChallenge;
        }
    }

    /// Feed one received message.
    pub fn handle(&mut self, message: &[u8]) -> Transition {
        match self.phase {
            InitiatorPhase::RequestSent | InitiatorPhase::AwaitingChallenge => {
                self.on_challenge(message)
            }
            InitiatorPhase::ResponseSent => self.on_verdict(message),
            InitiatorPhase::Authenticated => Transition::Pending,
            InitiatorPhase::Rejected | InitiatorPhase::TimedOut => Transition::Rejected(
                HandshakeError::MalformedInput(Cow::Borrowed("session already finished")),
            ),
        }
    }

    /// Give up waiting for the host.
    pub fn time_out(&mut self) -> HandshakeError {
        let waiting_for = match self.phase {
            InitiatorPhase::RequestSent | InitiatorPhase::AwaitingChallenge => {
                "awaiting challenge"
            }
            _ => "awaiting verdict",
        };
        if !self.phase.is_terminal() {
            self.phase = InitiatorPhase::TimedOut;
        }
        HandshakeError::Timeout(waiting_for)
    }

    fn on_challenge(&mut self, message: &[u8]) -> Transition {
        if message.len() != CHALLENGE_MESSAGE_SIZE {
            return self.reject(HandshakeError::MalformedInput(Cow::Owned(format!(
                "challenge of {} bytes, expected {CHALLENGE_MESSAGE_SIZE}",
                message.len()
            ))));
        }

        let challenge = match self.key.decrypt_prefixed(message, CHALLENGE_AAD) {
            Ok(plaintext) => Zeroizing::new(plaintext),
            Err(e) => return self.reject(e.into()),
        };
        let echo = match self.key.encrypt_prefixed(&challenge, RESPONSE_AAD) {
            Ok(echo) => echo,
            Err(e) => return self.reject(e.into()),
        };

        debug!(host = %self.host.short(), "Challenge decrypted, echo sent");
        self.phase = InitiatorPhase::ResponseSent;
        Transition::Send(echo)
    }

    fn on_verdict(&mut self, message: &[u8]) -> Transition {
        if !ct_eq(message, SUCCESS_MARKER) {
            return self.reject(HandshakeError::ChallengeMismatch);
        }

        debug!(host = %self.host.short(), "Host accepted challenge response");
        self.phase = InitiatorPhase::Authenticated;
        Transition::Complete {
            reply: None,
            peer: self.host,
        }
    }

    fn reject(&mut self, error: HandshakeError) -> Transition {
        debug!(host = %self.host.short(), "Initiator rejected session: {error}");
        self.phase = InitiatorPhase::Rejected;
        Transition::Rejected(error)
    }
}
