//! Signaling handoff from an authenticated rendezvous stream to a direct
//! peer transport.
//!
//! Once a rendezvous stream is authenticated, both sides run one round of
//! offer/answer signaling over it: the dialing side offers, the serving side
//! answers. A [`PeerConnector`] is the local end of the direct transport
//! being negotiated. It produces signaling units to relay to the remote
//! side, consumes the units the remote side relays back, and eventually
//! reports a live transport.
//!
//! Signaling units travel as JSON [`SignalMessage`]s inside length-prefixed
//! frames, so any number of them may be coalesced into one read or split
//! across several.

pub mod direct;
pub mod handoff;
pub mod memory;

pub use direct::{DirectConfig, DirectConnector};
pub use handoff::handoff;
pub use memory::{MemoryConnector, MemoryConnectorHub};

use crate::error::SignalingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One signaling unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalMessage {
    /// Session description from the offering side
    Offer {
        /// Opaque description
        sdp: String,
    },
    /// Session description from the answering side
    Answer {
        /// Opaque description
        sdp: String,
    },
    /// A transport candidate. An empty candidate ends the candidate list.
    Candidate {
        /// Opaque candidate
        candidate: String,
    },
}

impl SignalMessage {
    /// Candidate marking the end of the candidate list.
    #[must_use]
    pub fn end_of_candidates() -> Self {
        Self::Candidate {
            candidate: String::new(),
        }
    }
}

/// Which side of the offer/answer exchange a connector plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRole {
    /// Produces the offer (the dialing side)
    Offer,
    /// Answers an offer (the serving side)
    Answer,
}

/// Event reported by a connector.
#[derive(Debug)]
pub enum ConnectorEvent<T> {
    /// A signaling unit to relay to the remote side
    Signal(SignalMessage),
    /// The direct transport is live
    Connected(T),
    /// Negotiation failed
    Error(String),
}

/// Local end of a direct transport under negotiation.
#[async_trait]
pub trait PeerConnector: Send {
    /// Transport produced once connected.
    type Transport: Send + 'static;

    /// Wait for the next event. Returns `None` if the connector gave up.
    ///
    /// Must be cancel-safe.
    async fn next_event(&mut self) -> Option<ConnectorEvent<Self::Transport>>;

    /// Feed a signaling unit received from the remote side.
    async fn signal(&mut self, message: SignalMessage) -> Result<(), SignalingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_message_json() {
        let offer = SignalMessage::Offer {
            sdp: "v=0".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&offer).unwrap(),
            r#"{"type":"offer","sdp":"v=0"}"#
        );

        let parsed: SignalMessage =
            serde_json::from_str(r#"{"type":"candidate","candidate":""}"#).unwrap();
        assert_eq!(parsed, SignalMessage::end_of_candidates());
    }

    #[test]
    fn test_signal_message_rejects_unknown_type() {
        assert!(serde_json::from_str::<SignalMessage>(r#"{"type":"bye"}"#).is_err());
    }
}
