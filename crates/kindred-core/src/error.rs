//! Error types for kindred core.
//!
//! Every error here is local to one candidate stream or one `dial` call.
//! Nothing in this module is fatal to a listening node: the orchestrator
//! reports a failed candidate and keeps going.
//!
//! # Error Categories
//!
//! - [`HandshakeError`]: authentication of a single stream failed
//! - [`SignalingError`]: the direct transport could not be negotiated
//! - [`SessionError`]: either of the above, or an authenticated stranger
//! - [`DialError`]: a whole `dial` call ended without a session

use crate::framing::FrameError;
use kindred_crypto::{CryptoError, PublicIdentity};
use kindred_discovery::SwarmError;
use std::borrow::Cow;
use thiserror::Error;

/// Handshake failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Message had the wrong length or could not be parsed
    #[error("malformed input: {0}")]
    MalformedInput(Cow<'static, str>),

    /// Sealing, opening, key agreement or decryption failed
    #[error("cryptographic failure: {0}")]
    CryptoFailure(#[from] CryptoError),

    /// The peer did not prove possession of the claimed key
    #[error("challenge mismatch: authentication rejected")]
    ChallengeMismatch,

    /// The peer did not answer within the step timeout
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// The stream failed or closed mid-handshake
    #[error("transport error: {0}")]
    Transport(Cow<'static, str>),
}

impl HandshakeError {
    /// Whether the failure is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<FrameError> for HandshakeError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::TooLarge { .. } => Self::MalformedInput(Cow::Owned(err.to_string())),
            FrameError::Truncated { .. } | FrameError::Io(_) => {
                Self::Transport(Cow::Owned(err.to_string()))
            }
        }
    }
}

/// Signaling handoff failures.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The local connector reported an error or stopped
    #[error("connector error: {0}")]
    Connector(Cow<'static, str>),

    /// A signaling unit could not be decoded
    #[error("malformed signaling message: {0}")]
    Malformed(String),

    /// Stream framing failed
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No direct transport within the signaling timeout
    #[error("signaling timed out")]
    Timeout,
}

impl From<serde_json::Error> for SignalingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Failure of one candidate stream in `serve` or `dial`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Authentication failed
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Authenticated, but no direct transport was established
    #[error("signaling failed: {0}")]
    Signaling(#[from] SignalingError),

    /// Authenticated peer is not a known friend and strangers are refused
    #[error("unknown peer {}", .0.short())]
    UnknownPeer(PublicIdentity),
}

/// Failure of a whole `dial` call.
#[derive(Debug, Error)]
pub enum DialError {
    /// The swarm ran out of candidates without one authenticating
    #[error("no candidate authenticated")]
    Rejected,

    /// The dial deadline passed
    #[error("dial timed out")]
    TimedOut,

    /// The caller cancelled the dial
    #[error("dial cancelled")]
    Cancelled,

    /// The swarm refused to join the topic
    #[error("swarm error: {0}")]
    Swarm(#[from] SwarmError),
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    Invalid(Cow<'static, str>),
}

/// Chat channel errors.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Stream framing failed
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Message could not be encoded or decoded
    #[error("invalid chat message: {0}")]
    Json(#[from] serde_json::Error),
}
