//! Connection orchestration.
//!
//! Maps "serve" and "dial" intents onto rendezvous topic membership and runs
//! the right handshake role on every stream the swarm hands back:
//!
//! - [`Orchestrator::serve`] joins our own discovery topic and answers every
//!   inbound candidate with the Responder, then signals as the answering side.
//! - [`Orchestrator::dial`] joins the target's topic and runs the Initiator on
//!   every candidate, then signals as the offering side. The first candidate
//!   that both authenticates and produces a direct transport wins; the rest
//!   are abandoned and the swarm is closed.
//!
//! Each candidate runs in its own task. A failing candidate never affects the
//! topic or the other candidates.

mod dial;
mod serve;

pub use dial::DialHandle;
pub use serve::{ServeEvent, ServeHandle};

use crate::config::NodeConfig;
use crate::error::{ConfigError, SessionError};
use crate::framing::FrameStream;
use crate::friends::SharedFriends;
use crate::signaling::{PeerConnector, SignalRole};
use kindred_crypto::{Identity, PublicIdentity};
use kindred_discovery::Swarm;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// An authenticated peer and the direct transport negotiated with it.
pub struct PeerSession<T> {
    /// Identity the peer proved possession of
    pub peer: PublicIdentity,
    /// Direct transport. The rendezvous stream is already closed.
    pub transport: T,
}

impl<T> fmt::Debug for PeerSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Outcome of one candidate stream.
pub(crate) type CandidateResult<T> = Result<PeerSession<T>, SessionError>;

/// Close the rendezvous stream once the direct transport is live.
///
/// The session no longer depends on it, so a failed close is only logged.
pub(crate) async fn release_rendezvous<S>(mut stream: FrameStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = stream.shutdown().await {
        debug!("Rendezvous stream close failed: {e}");
    }
}

static NEXT_CANDIDATE: AtomicU64 = AtomicU64::new(1);

/// Number used to tell candidates apart in logs.
pub(crate) fn next_candidate_id() -> u64 {
    NEXT_CANDIDATE.fetch_add(1, Ordering::Relaxed)
}

/// Drives serve and dial for one identity.
///
/// `serve` and `dial` spawn onto the current Tokio runtime.
#[derive(Clone)]
pub struct Orchestrator {
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    friends: Option<SharedFriends>,
}

impl Orchestrator {
    /// Create an orchestrator for `identity`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn new(identity: Identity, config: NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            identity: Arc::new(identity),
            config: Arc::new(config),
            friends: None,
        })
    }

    /// Consult and update `friends` for every authenticated peer.
    #[must_use]
    pub fn with_friends(mut self, friends: SharedFriends) -> Self {
        self.friends = Some(friends);
        self
    }

    /// Our public identity.
    #[must_use]
    pub fn public_identity(&self) -> PublicIdentity {
        self.identity.public_identity()
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Serve on our own topic until the returned handle is cancelled or dropped.
    ///
    /// `connectors` creates one answering connector per authenticated candidate.
    pub fn serve<W, C, F>(&self, swarm: W, connectors: F) -> ServeHandle<C::Transport>
    where
        W: Swarm + 'static,
        C: PeerConnector + 'static,
        F: Fn(SignalRole) -> C + Send + Sync + 'static,
    {
        serve::spawn(
            Arc::clone(&self.identity),
            Arc::clone(&self.config),
            self.friends.clone(),
            swarm,
            Arc::new(connectors),
        )
    }

    /// Dial `target`. The returned handle resolves with the first session
    /// established, or fails once the dial times out, is cancelled, or the
    /// swarm runs out of candidates.
    ///
    /// `connectors` creates one offering connector per authenticated candidate.
    /// The swarm is closed when the dial ends.
    pub fn dial<W, C, F>(
        &self,
        target: PublicIdentity,
        swarm: W,
        connectors: F,
    ) -> DialHandle<C::Transport>
    where
        W: Swarm + 'static,
        C: PeerConnector + 'static,
        F: Fn(SignalRole) -> C + Send + Sync + 'static,
    {
        dial::spawn(
            Arc::clone(&self.identity),
            Arc::clone(&self.config),
            target,
            swarm,
            Arc::new(connectors),
        )
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("identity", &self.identity.public_identity())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
