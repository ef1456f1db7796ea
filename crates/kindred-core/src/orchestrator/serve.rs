//! Serve loop.

use super::{CandidateResult, PeerSession, next_candidate_id, release_rendezvous};
use crate::config::NodeConfig;
use crate::error::SessionError;
use crate::framing::FrameStream;
use crate::friends::SharedFriends;
use crate::handshake::respond;
use crate::signaling::{PeerConnector, SignalRole, handoff};
use kindred_crypto::Identity;
use kindred_discovery::{JoinOptions, Swarm, SwarmEvent, topic_for};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, debug_span, error, info, info_span, warn};

/// Reported by a running serve loop.
#[derive(Debug)]
pub enum ServeEvent<T> {
    /// The swarm is listening on `port`
    Listening {
        /// Bound port
        port: u16,
    },
    /// A candidate authenticated and a direct transport is live
    Session(PeerSession<T>),
    /// A candidate failed. The listener keeps running.
    Rejected {
        /// Why the candidate failed
        error: SessionError,
    },
}

/// Handle on a running serve loop. Dropping it stops the loop.
pub struct ServeHandle<T> {
    events: mpsc::UnboundedReceiver<ServeEvent<T>>,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl<T> ServeHandle<T> {
    /// Next event. Returns `None` once the loop has stopped.
    pub async fn next_event(&mut self) -> Option<ServeEvent<T>> {
        self.events.recv().await
    }

    /// Next established session, skipping other events.
    pub async fn next_session(&mut self) -> Option<PeerSession<T>> {
        loop {
            if let ServeEvent::Session(session) = self.next_event().await? {
                return Some(session);
            }
        }
    }

    /// Ask the loop to stop. In-flight candidates are abandoned, the topic is
    /// left and the swarm closed.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Stop the loop and wait until it has released the swarm.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub(super) fn spawn<W, C, F>(
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    friends: Option<SharedFriends>,
    swarm: W,
    connectors: Arc<F>,
) -> ServeHandle<C::Transport>
where
    W: Swarm + 'static,
    C: PeerConnector + 'static,
    F: Fn(SignalRole) -> C + Send + Sync + 'static,
{
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let span = info_span!("serve", identity = %identity.public_identity().short());

    let task = tokio::spawn(
        run(identity, config, friends, swarm, connectors, events_tx, cancel_rx).instrument(span),
    );

    ServeHandle {
        events: events_rx,
        cancel: Some(cancel_tx),
        task: Some(task),
    }
}

/// Listen on `port`, falling back to an OS-assigned port.
async fn listen<W: Swarm>(swarm: &mut W, port: u16) -> Option<u16> {
    let result = match swarm.listen(port).await {
        Err(e) if port != 0 => {
            warn!(port, "Listen failed ({e}), falling back to an OS-assigned port");
            swarm.listen(0).await
        }
        result => result,
    };

    match result {
        Ok(bound) => {
            info!(port = bound, "Listening");
            Some(bound)
        }
        Err(e) => {
            warn!("Listen failed: {e}");
            None
        }
    }
}

async fn run<W, C, F>(
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    friends: Option<SharedFriends>,
    mut swarm: W,
    connectors: Arc<F>,
    events: mpsc::UnboundedSender<ServeEvent<C::Transport>>,
    mut cancel: oneshot::Receiver<()>,
) where
    W: Swarm,
    C: PeerConnector + 'static,
    F: Fn(SignalRole) -> C + Send + Sync + 'static,
{
    let topic = topic_for(&identity.public_identity());

    if let Some(port) = listen(&mut swarm, config.listen_port).await {
        let _ = events.send(ServeEvent::Listening { port });
    }
    match swarm.join(topic, JoinOptions::announce(config.announce)).await {
        Ok(()) => info!(topic = %topic.short(), announce = config.announce, "Joined own topic"),
        Err(e) => warn!(topic = %topic.short(), "Failed to join own topic: {e}"),
    }

    let mut candidates = JoinSet::new();
    let mut swarm_open = true;

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            event = swarm.next_event(), if swarm_open => match event {
                Some(SwarmEvent::Connection(stream)) => {
                    let id = next_candidate_id();
                    debug!(candidate = id, "Inbound candidate");
                    candidates.spawn(
                        answer_candidate(
                            stream,
                            Arc::clone(&identity),
                            Arc::clone(&config),
                            friends.clone(),
                            Arc::clone(&connectors),
                        )
                        .instrument(debug_span!("candidate", id)),
                    );
                }
                Some(SwarmEvent::Error(e)) => {
                    warn!("Swarm error: {e}");
                    if let Some(port) = listen(&mut swarm, 0).await {
                        let _ = events.send(ServeEvent::Listening { port });
                    }
                }
                None => {
                    debug!("Swarm stopped producing candidates");
                    swarm_open = false;
                }
            },
            Some(joined) = candidates.join_next(), if !candidates.is_empty() => {
                let event = match joined {
                    Ok(Ok(session)) => ServeEvent::Session(session),
                    Ok(Err(error)) => {
                        warn!("Rejected candidate: {error}");
                        ServeEvent::Rejected { error }
                    }
                    Err(e) => {
                        if !e.is_cancelled() {
                            error!("Candidate task failed: {e}");
                        }
                        continue;
                    }
                };
                if events.send(event).is_err() {
                    debug!("Serve handle dropped");
                    break;
                }
            }
        }
    }

    candidates.shutdown().await;
    if let Err(e) = swarm.leave(&topic).await {
        debug!("Failed to leave own topic: {e}");
    }
    swarm.close().await;
    info!(topic = %topic.short(), "Stopped serving");
}

async fn answer_candidate<S, C, F>(
    stream: S,
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    friends: Option<SharedFriends>,
    connectors: Arc<F>,
) -> CandidateResult<C::Transport>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: PeerConnector,
    F: Fn(SignalRole) -> C + Send + Sync,
{
    let mut stream = FrameStream::new(stream, config.max_frame_len);
    let peer = respond(&mut stream, &identity, config.handshake_step_timeout).await?;

    let known = match &friends {
        Some(friends) => friends.write().await.mark_seen(&peer),
        None => false,
    };
    if !known && !config.accept_strangers {
        return Err(SessionError::UnknownPeer(peer));
    }

    let transport = handoff(
        &mut stream,
        connectors(SignalRole::Answer),
        config.signaling_timeout,
    )
    .await?;
    release_rendezvous(stream).await;

    info!(peer = %peer.short(), "Session established");
    Ok(PeerSession { peer, transport })
}
