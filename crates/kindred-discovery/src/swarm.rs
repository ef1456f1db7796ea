//! Rendezvous swarm contract.
//!
//! A swarm is the discovery collaborator the connection orchestrator drives:
//! it listens on a port, joins and leaves topics, and hands back one raw
//! duplex byte stream per peer it discovers on a joined topic. A swarm does
//! not authenticate anyone; every stream it produces is an untrusted
//! candidate.

use crate::topic::Topic;
use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Swarm errors
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Could not bind the requested listen port
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        /// Requested port
        port: u16,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Listener failed after it was bound
    #[error("Listener failed: {0}")]
    Listener(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Swarm was closed
    #[error("Swarm closed")]
    Closed,
}

/// Options for joining a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOptions {
    /// Accept peers that look this node up on the topic
    pub announce: bool,
    /// Actively connect to peers announcing the topic
    pub lookup: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            announce: true,
            lookup: true,
        }
    }
}

impl JoinOptions {
    /// Options with an explicit announce flag and lookup enabled.
    #[must_use]
    pub fn announce(announce: bool) -> Self {
        Self {
            announce,
            ..Self::default()
        }
    }
}

/// Event produced by a swarm.
#[derive(Debug)]
pub enum SwarmEvent<S> {
    /// A new raw stream to a peer on a joined topic
    Connection(S),
    /// The swarm hit an error; it keeps running
    Error(SwarmError),
}

/// Rendezvous swarm.
///
/// `next_event` must be cancel-safe: dropping its future before it
/// completes must not lose an event.
#[async_trait]
pub trait Swarm: Send {
    /// Raw duplex stream type handed out per discovered peer.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Start (or restart) listening, returning the bound port.
    ///
    /// Port 0 asks for any free port.
    async fn listen(&mut self, port: u16) -> Result<u16, SwarmError>;

    /// Join a topic.
    async fn join(&mut self, topic: Topic, options: JoinOptions) -> Result<(), SwarmError>;

    /// Leave a topic. Leaving a topic that is not joined is a no-op.
    async fn leave(&mut self, topic: &Topic) -> Result<(), SwarmError>;

    /// Wait for the next event. Returns `None` once the swarm is closed.
    async fn next_event(&mut self) -> Option<SwarmEvent<Self::Stream>>;

    /// Leave every topic, stop listening and end the event stream.
    async fn close(&mut self);
}
