//! In-process rendezvous.
//!
//! [`MemoryRendezvous`] is a hub shared by any number of [`MemorySwarm`]
//! handles. Whenever two handles are joined to the same topic, and at least
//! one of them announces while the other looks up, each receives one end of
//! a fresh [`tokio::io::duplex`] pipe. Listen ports are simulated so that
//! bind conflicts and the fallback to an OS-assigned port can be exercised
//! without sockets.

use crate::swarm::{JoinOptions, Swarm, SwarmError, SwarmEvent};
use crate::topic::Topic;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

/// Default per-direction buffer of an in-memory stream.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// First port handed out for `listen(0)`.
const EPHEMERAL_PORT_START: u16 = 49152;

type EventSender = mpsc::UnboundedSender<SwarmEvent<DuplexStream>>;

struct Member {
    swarm: u64,
    options: JoinOptions,
    events: EventSender,
}

#[derive(Default)]
struct HubState {
    next_swarm: u64,
    next_port: u16,
    ports: HashMap<u16, u64>,
    topics: HashMap<Topic, Vec<Member>>,
}

impl HubState {
    fn allocate_port(&mut self) -> u16 {
        if self.next_port < EPHEMERAL_PORT_START {
            self.next_port = EPHEMERAL_PORT_START;
        }
        while self.ports.contains_key(&self.next_port) {
            self.next_port = self.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
        }
        let port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(EPHEMERAL_PORT_START);
        port
    }

    fn release_port(&mut self, swarm: u64) {
        self.ports.retain(|_, owner| *owner != swarm);
    }

    fn remove_member(&mut self, swarm: u64, topic: &Topic) {
        if let Some(members) = self.topics.get_mut(topic) {
            members.retain(|m| m.swarm != swarm);
            if members.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    fn remove_everywhere(&mut self, swarm: u64) {
        for members in self.topics.values_mut() {
            members.retain(|m| m.swarm != swarm);
        }
        self.topics.retain(|_, members| !members.is_empty());
        self.release_port(swarm);
    }
}

fn lock(hub: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

fn should_pair(a: JoinOptions, b: JoinOptions) -> bool {
    (a.lookup && b.announce) || (a.announce && b.lookup)
}

/// Shared in-process rendezvous hub.
#[derive(Clone)]
pub struct MemoryRendezvous {
    hub: Arc<Mutex<HubState>>,
    buffer_size: usize,
}

impl Default for MemoryRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRendezvous {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create an empty hub whose streams buffer `buffer_size` bytes per direction.
    #[must_use]
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            hub: Arc::new(Mutex::new(HubState::default())),
            buffer_size,
        }
    }

    /// Create a new swarm handle attached to this hub.
    #[must_use]
    pub fn swarm(&self) -> MemorySwarm {
        let id = {
            let mut state = lock(&self.hub);
            state.next_swarm += 1;
            state.next_swarm
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        MemorySwarm {
            id,
            hub: Arc::clone(&self.hub),
            buffer_size: self.buffer_size,
            events_tx,
            events_rx,
            closed: false,
        }
    }

    /// Number of swarms currently joined to `topic`.
    #[must_use]
    pub fn members(&self, topic: &Topic) -> usize {
        lock(&self.hub).topics.get(topic).map_or(0, Vec::len)
    }

    /// Whether `port` is held by a listening swarm.
    #[must_use]
    pub fn is_listening(&self, port: u16) -> bool {
        lock(&self.hub).ports.contains_key(&port)
    }
}

/// One node's handle on a [`MemoryRendezvous`].
pub struct MemorySwarm {
    id: u64,
    hub: Arc<Mutex<HubState>>,
    buffer_size: usize,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<SwarmEvent<DuplexStream>>,
    closed: bool,
}

impl MemorySwarm {
    /// Deliver an error event to this swarm, as a failing listener would.
    pub fn inject_error(&self, error: SwarmError) {
        let _ = self.events_tx.send(SwarmEvent::Error(error));
    }
}

#[async_trait]
impl Swarm for MemorySwarm {
    type Stream = DuplexStream;

    async fn listen(&mut self, port: u16) -> Result<u16, SwarmError> {
        if self.closed {
            return Err(SwarmError::Closed);
        }

        let mut state = lock(&self.hub);
        if port != 0 {
            if let Some(owner) = state.ports.get(&port) {
                if *owner != self.id {
                    return Err(SwarmError::Bind {
                        port,
                        source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
                    });
                }
            }
        }

        state.release_port(self.id);
        let bound = if port == 0 { state.allocate_port() } else { port };
        state.ports.insert(bound, self.id);
        Ok(bound)
    }

    async fn join(&mut self, topic: Topic, options: JoinOptions) -> Result<(), SwarmError> {
        if self.closed {
            return Err(SwarmError::Closed);
        }

        let mut state = lock(&self.hub);
        let members = state.topics.entry(topic).or_default();

        if let Some(existing) = members.iter_mut().find(|m| m.swarm == self.id) {
            existing.options = options;
            return Ok(());
        }

        let mut paired = 0usize;
        for member in members.iter() {
            if !should_pair(options, member.options) {
                continue;
            }
            let (local, remote) = tokio::io::duplex(self.buffer_size);
            if member.events.send(SwarmEvent::Connection(remote)).is_ok() {
                let _ = self.events_tx.send(SwarmEvent::Connection(local));
                paired += 1;
            }
        }

        members.push(Member {
            swarm: self.id,
            options,
            events: self.events_tx.clone(),
        });

        debug!(topic = %topic.short(), swarm = self.id, paired, "Joined memory topic");
        Ok(())
    }

    async fn leave(&mut self, topic: &Topic) -> Result<(), SwarmError> {
        lock(&self.hub).remove_member(self.id, topic);
        debug!(topic = %topic.short(), swarm = self.id, "Left memory topic");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SwarmEvent<DuplexStream>> {
        if self.closed {
            return None;
        }
        self.events_rx.recv().await
    }

    async fn close(&mut self) {
        lock(&self.hub).remove_everywhere(self.id);
        self.closed = true;
        self.events_rx.close();
    }
}

impl Drop for MemorySwarm {
    fn drop(&mut self) {
        lock(&self.hub).remove_everywhere(self.id);
    }
}
