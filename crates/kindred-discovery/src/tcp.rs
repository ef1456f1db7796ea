//! Static-peer TCP rendezvous.
//!
//! [`TcpSwarm`] is a minimal rendezvous for nodes that can reach each other
//! directly. Joining a topic with `lookup` connects to every configured peer
//! address and writes the 32-byte topic as a preface; the accepting side
//! reads the preface and only delivers the stream if it has that topic
//! joined with `announce`. Unreachable peers are retried at a fixed interval
//! (plus jitter). A peer that was reached is dialed again once the stream it
//! produced is dropped, so a rejected candidate does not end the lookup. All
//! of this stops when the topic is left.

use crate::swarm::{JoinOptions, Swarm, SwarmError, SwarmEvent};
use crate::topic::{TOPIC_SIZE, Topic};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type EventSender = mpsc::UnboundedSender<SwarmEvent<TcpSwarmStream>>;
type JoinedTopics = Arc<Mutex<HashMap<Topic, JoinOptions>>>;

/// TCP swarm configuration
#[derive(Debug, Clone)]
pub struct TcpSwarmConfig {
    /// Address to bind the listener on
    pub bind_addr: IpAddr,
    /// Peers to connect to when looking up a topic
    pub peers: Vec<SocketAddr>,
    /// Delay between connect attempts to an unreachable peer
    pub retry_interval: Duration,
    /// Time an inbound connection has to send its topic preface
    pub preface_timeout: Duration,
}

impl Default for TcpSwarmConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            peers: Vec::new(),
            retry_interval: Duration::from_secs(2),
            preface_timeout: Duration::from_secs(5),
        }
    }
}

/// Raw stream handed out by [`TcpSwarm`].
///
/// Outbound streams tell the lookup task that produced them when they are
/// dropped, which re-arms the lookup for that peer.
#[derive(Debug)]
pub struct TcpSwarmStream {
    inner: TcpStream,
    _released: Option<oneshot::Sender<()>>,
}

impl TcpSwarmStream {
    fn inbound(inner: TcpStream) -> Self {
        Self {
            inner,
            _released: None,
        }
    }

    fn outbound(inner: TcpStream, released: oneshot::Sender<()>) -> Self {
        Self {
            inner,
            _released: Some(released),
        }
    }
}

impl AsyncRead for TcpSwarmStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TcpSwarmStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn lock(
    joined: &Mutex<HashMap<Topic, JoinOptions>>,
) -> MutexGuard<'_, HashMap<Topic, JoinOptions>> {
    joined.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Static-peer TCP swarm
pub struct TcpSwarm {
    config: TcpSwarmConfig,
    joined: JoinedTopics,
    lookups: HashMap<Topic, Vec<JoinHandle<()>>>,
    listener: Option<JoinHandle<()>>,
    local_port: Option<u16>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<SwarmEvent<TcpSwarmStream>>,
    closed: bool,
}

impl TcpSwarm {
    /// Create a swarm. Nothing is bound until [`Swarm::listen`] is called.
    #[must_use]
    pub fn new(config: TcpSwarmConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            joined: Arc::new(Mutex::new(HashMap::new())),
            lookups: HashMap::new(),
            listener: None,
            local_port: None,
            events_tx,
            events_rx,
            closed: false,
        }
    }

    /// Port currently listened on, if any
    #[must_use]
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    fn spawn_lookups(&mut self, topic: Topic) {
        let handles = self
            .config
            .peers
            .iter()
            .map(|addr| {
                tokio::spawn(lookup_peer(
                    *addr,
                    topic,
                    self.config.retry_interval,
                    self.events_tx.clone(),
                ))
            })
            .collect();
        self.lookups.insert(topic, handles);
    }

    fn abort_lookups(&mut self, topic: &Topic) {
        if let Some(handles) = self.lookups.remove(topic) {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    joined: JoinedTopics,
    events: EventSender,
    preface_timeout: Duration,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_inbound(
                    stream,
                    addr,
                    Arc::clone(&joined),
                    events.clone(),
                    preface_timeout,
                ));
            }
            Err(e) => {
                warn!("TCP swarm listener failed: {e}");
                let _ = events.send(SwarmEvent::Error(SwarmError::Listener(e.to_string())));
                return;
            }
        }
    }
}

async fn handle_inbound(
    mut stream: TcpStream,
    addr: SocketAddr,
    joined: JoinedTopics,
    events: EventSender,
    preface_timeout: Duration,
) {
    let mut preface = [0u8; TOPIC_SIZE];
    match tokio::time::timeout(preface_timeout, stream.read_exact(&mut preface)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            trace!(%addr, "Inbound connection closed before preface: {e}");
            return;
        }
        Err(_) => {
            trace!(%addr, "Inbound connection sent no preface in time");
            return;
        }
    }

    let topic = Topic::from_bytes(preface);
    let announced = lock(&joined).get(&topic).is_some_and(|options| options.announce);
    if !announced {
        trace!(%addr, topic = %topic.short(), "Dropping inbound connection for unannounced topic");
        return;
    }

    let _ = stream.set_nodelay(true);
    debug!(%addr, topic = %topic.short(), "Inbound swarm connection");
    let _ = events.send(SwarmEvent::Connection(TcpSwarmStream::inbound(stream)));
}

async fn lookup_peer(
    addr: SocketAddr,
    topic: Topic,
    retry_interval: Duration,
    events: EventSender,
) {
    loop {
        match TcpStream::connect(addr).await {
            Ok(mut stream) => match stream.write_all(topic.as_bytes()).await {
                Ok(()) => {
                    let _ = stream.set_nodelay(true);
                    debug!(%addr, topic = %topic.short(), "Outbound swarm connection");

                    let (released_tx, released_rx) = oneshot::channel();
                    let delivered = TcpSwarmStream::outbound(stream, released_tx);
                    if events.send(SwarmEvent::Connection(delivered)).is_err() {
                        return;
                    }
                    // Resolves with an error once the stream is dropped.
                    let _ = released_rx.await;
                    trace!(%addr, topic = %topic.short(), "Swarm stream released, redialing");
                }
                Err(e) => trace!(%addr, "Failed to send topic preface: {e}"),
            },
            Err(e) => trace!(%addr, "Connect failed: {e}"),
        }

        tokio::time::sleep(with_jitter(retry_interval)).await;
    }
}

fn with_jitter(interval: Duration) -> Duration {
    let max_jitter = u64::try_from(interval.as_millis() / 4).unwrap_or(u64::MAX);
    interval + Duration::from_millis(rand::thread_rng().gen_range(0..=max_jitter))
}

#[async_trait]
impl Swarm for TcpSwarm {
    type Stream = TcpSwarmStream;

    async fn listen(&mut self, port: u16) -> Result<u16, SwarmError> {
        if self.closed {
            return Err(SwarmError::Closed);
        }

        let listener = TcpListener::bind((self.config.bind_addr, port))
            .await
            .map_err(|source| SwarmError::Bind { port, source })?;
        let bound = listener.local_addr()?.port();

        if let Some(previous) = self.listener.take() {
            previous.abort();
        }
        self.listener = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.joined),
            self.events_tx.clone(),
            self.config.preface_timeout,
        )));
        self.local_port = Some(bound);

        debug!(port = bound, "TCP swarm listening");
        Ok(bound)
    }

    async fn join(&mut self, topic: Topic, options: JoinOptions) -> Result<(), SwarmError> {
        if self.closed {
            return Err(SwarmError::Closed);
        }

        lock(&self.joined).insert(topic, options);

        let looking_up = self.lookups.contains_key(&topic);
        if options.lookup && !looking_up {
            self.spawn_lookups(topic);
        } else if !options.lookup && looking_up {
            self.abort_lookups(&topic);
        }

        debug!(topic = %topic.short(), announce = options.announce, "Joined TCP topic");
        Ok(())
    }

    async fn leave(&mut self, topic: &Topic) -> Result<(), SwarmError> {
        lock(&self.joined).remove(topic);
        self.abort_lookups(topic);
        debug!(topic = %topic.short(), "Left TCP topic");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SwarmEvent<TcpSwarmStream>> {
        if self.closed {
            return None;
        }
        self.events_rx.recv().await
    }

    async fn close(&mut self) {
        lock(&self.joined).clear();
        let topics: Vec<Topic> = self.lookups.keys().copied().collect();
        for topic in &topics {
            self.abort_lookups(topic);
        }
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        self.local_port = None;
        self.closed = true;
        self.events_rx.close();
    }
}

impl Drop for TcpSwarm {
    fn drop(&mut self) {
        for handles in self.lookups.values() {
            for handle in handles {
                handle.abort();
            }
        }
        if let Some(listener) = &self.listener {
            listener.abort();
        }
    }
}
