//! Dial loop.

use super::{CandidateResult, PeerSession, next_candidate_id, release_rendezvous};
use crate::config::NodeConfig;
use crate::error::DialError;
use crate::framing::FrameStream;
use crate::handshake::initiate;
use crate::signaling::{PeerConnector, SignalRole, handoff};
use kindred_crypto::{Identity, PublicIdentity};
use kindred_discovery::{JoinOptions, Swarm, SwarmEvent, Topic, topic_for};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, error, info, info_span, warn};

/// Pending dial. Resolves with the established session.
///
/// Dropping the handle cancels the dial.
pub struct DialHandle<T> {
    result: oneshot::Receiver<Result<PeerSession<T>, DialError>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl<T> DialHandle<T> {
    /// Cancel the dial. The handle then resolves with [`DialError::Cancelled`]
    /// unless a session was already established.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl<T> Future for DialHandle<T> {
    type Output = Result<PeerSession<T>, DialError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(DialError::Cancelled)))
    }
}

pub(super) fn spawn<W, C, F>(
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    target: PublicIdentity,
    swarm: W,
    connectors: Arc<F>,
) -> DialHandle<C::Transport>
where
    W: Swarm + 'static,
    C: PeerConnector + 'static,
    F: Fn(SignalRole) -> C + Send + Sync + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let span = info_span!("dial", host = %target.short());

    tokio::spawn(
        async move {
            let result = run(identity, config, target, swarm, connectors, cancel_rx).await;
            let _ = result_tx.send(result);
        }
        .instrument(span),
    );

    DialHandle {
        result: result_rx,
        cancel: Some(cancel_tx),
    }
}

async fn run<W, C, F>(
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    target: PublicIdentity,
    mut swarm: W,
    connectors: Arc<F>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<PeerSession<C::Transport>, DialError>
where
    W: Swarm,
    C: PeerConnector + 'static,
    F: Fn(SignalRole) -> C + Send + Sync + 'static,
{
    let topic = topic_for(&target);
    let result = dial_topic(
        &identity,
        &config,
        target,
        topic,
        &mut swarm,
        &connectors,
        &mut cancel,
    )
    .await;

    if let Err(e) = swarm.leave(&topic).await {
        debug!("Failed to leave target topic: {e}");
    }
    swarm.close().await;

    match &result {
        Ok(session) => info!(peer = %session.peer.short(), "Dial succeeded"),
        Err(e) => warn!("Dial failed: {e}"),
    }
    result
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn dial_topic<W, C, F>(
    identity: &Arc<Identity>,
    config: &Arc<NodeConfig>,
    target: PublicIdentity,
    topic: Topic,
    swarm: &mut W,
    connectors: &Arc<F>,
    cancel: &mut oneshot::Receiver<()>,
) -> Result<PeerSession<C::Transport>, DialError>
where
    W: Swarm,
    C: PeerConnector + 'static,
    F: Fn(SignalRole) -> C + Send + Sync + 'static,
{
    swarm
        .join(
            topic,
            JoinOptions {
                announce: false,
                lookup: true,
            },
        )
        .await?;
    info!(topic = %topic.short(), "Joined target topic");

    let deadline = config.dial_timeout.map(|timeout| Instant::now() + timeout);
    let mut candidates = JoinSet::new();
    let mut swarm_open = true;

    loop {
        if !swarm_open && candidates.is_empty() {
            return Err(DialError::Rejected);
        }

        tokio::select! {
            _ = &mut *cancel => return Err(DialError::Cancelled),
            () = expired(deadline) => return Err(DialError::TimedOut),
            event = swarm.next_event(), if swarm_open => match event {
                Some(SwarmEvent::Connection(stream)) => {
                    let id = next_candidate_id();
                    debug!(candidate = id, "Outbound candidate");
                    candidates.spawn(
                        offer_candidate(
                            stream,
                            Arc::clone(identity),
                            Arc::clone(config),
                            target,
                            Arc::clone(connectors),
                        )
                        .instrument(debug_span!("candidate", id)),
                    );
                }
                Some(SwarmEvent::Error(e)) => warn!("Swarm error: {e}"),
                None => {
                    debug!("Swarm stopped producing candidates");
                    swarm_open = false;
                }
            },
            Some(joined) = candidates.join_next(), if !candidates.is_empty() => match joined {
                Ok(Ok(session)) => {
                    candidates.shutdown().await;
                    return Ok(session);
                }
                Ok(Err(e)) => warn!("Rejected candidate: {e}"),
                Err(e) => {
                    if !e.is_cancelled() {
                        error!("Candidate task failed: {e}");
                    }
                }
            },
        }
    }
}

async fn offer_candidate<S, C, F>(
    stream: S,
    identity: Arc<Identity>,
    config: Arc<NodeConfig>,
    target: PublicIdentity,
    connectors: Arc<F>,
) -> CandidateResult<C::Transport>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: PeerConnector,
    F: Fn(SignalRole) -> C + Send + Sync,
{
    let mut stream = FrameStream::new(stream, config.max_frame_len);
    let peer = initiate(&mut stream, &identity, target, config.handshake_step_timeout).await?;

    let transport = handoff(
        &mut stream,
        connectors(SignalRole::Offer),
        config.signaling_timeout,
    )
    .await?;
    release_rendezvous(stream).await;

    Ok(PeerSession { peer, transport })
}
