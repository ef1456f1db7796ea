//! In-process connector for tests and local demos.
//!
//! The offering connector parks one end of a [`tokio::io::duplex`] pipe in a
//! shared [`MemoryConnectorHub`] under a fresh token and offers that token.
//! The answering connector claims the parked end when the offer reaches it,
//! answers with the same token and reports the pipe as connected. The
//! offering side reports its end as connected when the answer arrives.

use super::{ConnectorEvent, PeerConnector, SignalMessage, SignalRole};
use crate::error::SignalingError;
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

type ParkedOffers = Arc<Mutex<HashMap<String, DuplexStream>>>;

fn lock(
    offers: &Mutex<HashMap<String, DuplexStream>>,
) -> MutexGuard<'_, HashMap<String, DuplexStream>> {
    offers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared state of in-process connectors.
#[derive(Clone)]
pub struct MemoryConnectorHub {
    offers: ParkedOffers,
    next_token: Arc<AtomicU64>,
    buffer_size: usize,
}

impl Default for MemoryConnectorHub {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnectorHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            offers: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Create a connector playing `role`.
    #[must_use]
    pub fn connector(&self, role: SignalRole) -> MemoryConnector {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut connector = MemoryConnector {
            role,
            offers: Arc::clone(&self.offers),
            token: None,
            local: None,
            events_tx,
            events_rx,
        };

        if role == SignalRole::Offer {
            let token = format!(
                "memory-{}",
                self.next_token.fetch_add(1, Ordering::Relaxed)
            );
            let (local, remote) = tokio::io::duplex(self.buffer_size);
            lock(&self.offers).insert(token.clone(), remote);
            connector.emit(ConnectorEvent::Signal(SignalMessage::Offer { sdp: token.clone() }));
            connector.token = Some(token);
            connector.local = Some(local);
        }

        connector
    }

    /// Offers not yet claimed by an answering connector.
    #[must_use]
    pub fn pending_offers(&self) -> usize {
        lock(&self.offers).len()
    }
}

/// In-process connector.
pub struct MemoryConnector {
    role: SignalRole,
    offers: ParkedOffers,
    token: Option<String>,
    local: Option<DuplexStream>,
    events_tx: mpsc::UnboundedSender<ConnectorEvent<DuplexStream>>,
    events_rx: mpsc::UnboundedReceiver<ConnectorEvent<DuplexStream>>,
}

impl MemoryConnector {
    fn emit(&self, event: ConnectorEvent<DuplexStream>) {
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl PeerConnector for MemoryConnector {
    type Transport = DuplexStream;

    async fn next_event(&mut self) -> Option<ConnectorEvent<DuplexStream>> {
        self.events_rx.recv().await
    }

    async fn signal(&mut self, message: SignalMessage) -> Result<(), SignalingError> {
        match (self.role, message) {
            (_, SignalMessage::Candidate { .. }) => Ok(()),
            (SignalRole::Offer, SignalMessage::Answer { sdp }) => {
                if self.token.as_deref() != Some(sdp.as_str()) {
                    return Err(SignalingError::Connector(Cow::Owned(format!(
                        "answer for unknown offer {sdp}"
                    ))));
                }
                if let Some(local) = self.local.take() {
                    self.emit(ConnectorEvent::Connected(local));
                }
                Ok(())
            }
            (SignalRole::Answer, SignalMessage::Offer { sdp }) => {
                let claimed = lock(&self.offers).remove(&sdp);
                match claimed {
                    Some(remote) => {
                        self.emit(ConnectorEvent::Signal(SignalMessage::Answer { sdp }));
                        self.emit(ConnectorEvent::Connected(remote));
                    }
                    None => self.emit(ConnectorEvent::Error(format!("unknown offer {sdp}"))),
                }
                Ok(())
            }
            (role, message) => Err(SignalingError::Connector(Cow::Owned(format!(
                "{role:?} side cannot accept {message:?}"
            )))),
        }
    }
}

impl Drop for MemoryConnector {
    fn drop(&mut self) {
        if let Some(token) = &self.token {
            lock(&self.offers).remove(token);
        }
    }
}
