//! # kindred Core
//!
//! Authenticated rendezvous for kindred: finds a friend on a public swarm,
//! proves both identities over the first stream that reaches it, and hands
//! that stream over to a direct transport.
//!
//! This crate provides:
//! - Length-prefixed framing for rendezvous streams
//! - The challenge-response handshake (Responder and Initiator)
//! - Offer/answer signaling over an authenticated stream
//! - The serve/dial orchestrator
//! - Node configuration, a bounded friend registry and a thin chat channel
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                             │
//! │   (serve own topic / dial a friend's topic, one task per        │
//! │    candidate stream)                                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Handshake                               │
//! │   (sealed auth request, encrypted challenge, success marker)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Signaling                               │
//! │   (offer/answer relay until the direct transport is live)       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          Framing                                │
//! │   (u32 length prefix over the swarm's byte stream)              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use kindred_core::{NodeConfig, Orchestrator};
//! use kindred_core::signaling::MemoryConnectorHub;
//! use kindred_crypto::Identity;
//! use kindred_discovery::MemoryRendezvous;
//! use rand_core::OsRng;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rendezvous = MemoryRendezvous::new();
//! let signaling = MemoryConnectorHub::new();
//!
//! let host = Orchestrator::new(Identity::generate(&mut OsRng), NodeConfig::default())?;
//! let guest = Orchestrator::new(Identity::generate(&mut OsRng), NodeConfig::default())?;
//!
//! let hub = signaling.clone();
//! let mut serving = host.serve(rendezvous.swarm(), move |role| hub.connector(role));
//!
//! let session = guest
//!     .dial(host.public_identity(), rendezvous.swarm(), move |role| signaling.connector(role))
//!     .await?;
//! assert_eq!(session.peer, host.public_identity());
//!
//! let accepted = serving.next_session().await.ok_or("serve stopped")?;
//! assert_eq!(accepted.peer, guest.public_identity());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chat;
pub mod config;
pub mod error;
pub mod framing;
pub mod friends;
pub mod handshake;
pub mod orchestrator;
pub mod signaling;

pub use chat::{ChatChannel, ChatMessage};
pub use config::NodeConfig;
pub use error::{
    ChatError, ConfigError, DialError, HandshakeError, SessionError, SignalingError,
};
pub use framing::{FrameDecoder, FrameError, FrameStream};
pub use friends::{Friend, FriendRegistry, SharedFriends};
pub use orchestrator::{DialHandle, Orchestrator, PeerSession, ServeEvent, ServeHandle};
pub use signaling::{ConnectorEvent, PeerConnector, SignalMessage, SignalRole};
