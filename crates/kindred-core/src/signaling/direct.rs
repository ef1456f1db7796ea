//! Direct TCP connector.
//!
//! A stand-in for a WebRTC-style peer connection that works whenever the
//! answering side can reach the offering side over TCP:
//!
//! 1. The offering side binds an ephemeral listener and signals an offer
//!    carrying a random token, one candidate per advertised address, and an
//!    end-of-candidates marker.
//! 2. The answering side tries the candidates in order. On each connection
//!    it writes the token and waits for a one-byte acknowledgement.
//! 3. The offering side checks every accepted connection concurrently,
//!    acknowledges the first one that presents the right token and reports it
//!    as connected. The answering side answers
//!    and reports the same connection as connected.

use super::{ConnectorEvent, PeerConnector, SignalMessage, SignalRole};
use crate::error::SignalingError;
use async_trait::async_trait;
use kindred_crypto::constant_time::ct_eq;
use kindred_crypto::random::fill_random;
use std::borrow::Cow;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// Description prefix of direct offers and answers.
pub const DIRECT_SDP: &str = "kindred-direct/1";

const TOKEN_LEN: usize = 16;
const ACK: u8 = 0x01;
const CANDIDATE_PREFIX: &str = "tcp ";

type Token = [u8; TOKEN_LEN];
type EventSender = mpsc::UnboundedSender<ConnectorEvent<TcpStream>>;

/// Direct connector configuration
#[derive(Debug, Clone)]
pub struct DirectConfig {
    /// Address the offering side binds its listener on
    pub bind_addr: IpAddr,
    /// Addresses advertised as candidates. Empty means loopback when bound
    /// to the unspecified address, otherwise the bind address.
    pub advertise: Vec<IpAddr>,
    /// Time allowed for each connection attempt and its acknowledgement
    pub connect_timeout: Duration,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertise: Vec::new(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl DirectConfig {
    fn advertised(&self) -> Vec<IpAddr> {
        if !self.advertise.is_empty() {
            return self.advertise.clone();
        }
        match self.bind_addr {
            IpAddr::V4(ip) if ip.is_unspecified() => vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
            IpAddr::V6(ip) if ip.is_unspecified() => vec![IpAddr::V6(Ipv6Addr::LOCALHOST)],
            ip => vec![ip],
        }
    }
}

fn format_candidate(addr: SocketAddr) -> String {
    format!("{CANDIDATE_PREFIX}{addr}")
}

fn parse_candidate(candidate: &str) -> Option<SocketAddr> {
    candidate.strip_prefix(CANDIDATE_PREFIX)?.parse().ok()
}

fn parse_offer(sdp: &str) -> Option<Token> {
    let token_hex = sdp.strip_prefix(DIRECT_SDP)?.trim();
    hex::decode(token_hex).ok()?.try_into().ok()
}

/// Direct TCP connector.
///
/// Must be created inside a Tokio runtime.
pub struct DirectConnector {
    role: SignalRole,
    config: DirectConfig,
    candidates: Option<mpsc::UnboundedSender<SocketAddr>>,
    events_tx: EventSender,
    events_rx: mpsc::UnboundedReceiver<ConnectorEvent<TcpStream>>,
    tasks: JoinSet<()>,
}

impl DirectConnector {
    /// Create a connector playing `role`.
    ///
    /// An offering connector binds its listener immediately; a bind failure
    /// is reported as its first event.
    #[must_use]
    pub fn new(role: SignalRole, config: DirectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut connector = Self {
            role,
            config,
            candidates: None,
            events_tx,
            events_rx,
            tasks: JoinSet::new(),
        };

        if role == SignalRole::Offer {
            if let Err(e) = connector.start_offer() {
                connector.emit(ConnectorEvent::Error(format!("direct offer failed: {e}")));
            }
        }
        connector
    }

    fn emit(&self, event: ConnectorEvent<TcpStream>) {
        let _ = self.events_tx.send(event);
    }

    fn start_offer(&mut self) -> io::Result<()> {
        let mut token = [0u8; TOKEN_LEN];
        fill_random(&mut token).map_err(io::Error::other)?;

        let listener = std::net::TcpListener::bind((self.config.bind_addr, 0))?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        let port = listener.local_addr()?.port();

        self.emit(ConnectorEvent::Signal(SignalMessage::Offer {
            sdp: format!("{DIRECT_SDP} {}", hex::encode(token)),
        }));
        for ip in self.config.advertised() {
            self.emit(ConnectorEvent::Signal(SignalMessage::Candidate {
                candidate: format_candidate(SocketAddr::new(ip, port)),
            }));
        }
        self.emit(ConnectorEvent::Signal(SignalMessage::end_of_candidates()));

        debug!(port, "Direct offer listening");
        self.tasks.spawn(accept_offer(
            listener,
            token,
            self.events_tx.clone(),
            self.config.connect_timeout,
        ));
        Ok(())
    }

    fn start_answer(&mut self, token: Token) {
        let (candidates_tx, candidates_rx) = mpsc::unbounded_channel();
        self.candidates = Some(candidates_tx);
        self.tasks.spawn(answer_candidates(
            token,
            candidates_rx,
            self.events_tx.clone(),
            self.config.connect_timeout,
        ));
    }
}

async fn accept_offer(listener: TcpListener, token: Token, events: EventSender, timeout: Duration) {
    let mut pending = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    pending.spawn(read_token(stream, addr, token, timeout));
                }
                Err(e) => {
                    let message = format!("direct accept failed: {e}");
                    let _ = events.send(ConnectorEvent::Error(message));
                    return;
                }
            },
            Some(verified) = pending.join_next() => {
                let Ok(Some((mut stream, addr))) = verified else {
                    continue;
                };
                if stream.write_all(&[ACK]).await.is_ok() {
                    let _ = stream.set_nodelay(true);
                    debug!(%addr, "Direct connection accepted");
                    let _ = events.send(ConnectorEvent::Connected(stream));
                    return;
                }
            }
        }
    }
}

/// Wait for `stream` to present the offer token.
async fn read_token(
    mut stream: TcpStream,
    addr: SocketAddr,
    token: Token,
    timeout: Duration,
) -> Option<(TcpStream, SocketAddr)> {
    let mut presented = [0u8; TOKEN_LEN];
    match tokio::time::timeout(timeout, stream.read_exact(&mut presented)).await {
        Ok(Ok(_)) if ct_eq(&presented, &token) => Some((stream, addr)),
        _ => {
            trace!(%addr, "Dropping direct connection without a valid token");
            None
        }
    }
}

async fn try_candidate(
    addr: SocketAddr,
    token: &Token,
    timeout: Duration,
) -> io::Result<TcpStream> {
    let attempt = async {
        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(token).await?;
        let mut ack = [0u8; 1];
        stream.read_exact(&mut ack).await?;
        if ack[0] != ACK {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad acknowledgement"));
        }
        Ok(stream)
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "candidate timed out")),
    }
}

async fn answer_candidates(
    token: Token,
    mut candidates: mpsc::UnboundedReceiver<SocketAddr>,
    events: EventSender,
    timeout: Duration,
) {
    while let Some(addr) = candidates.recv().await {
        match try_candidate(addr, &token, timeout).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                debug!(%addr, "Direct connection established");
                let _ = events.send(ConnectorEvent::Signal(SignalMessage::Answer {
                    sdp: DIRECT_SDP.to_string(),
                }));
                let _ = events.send(ConnectorEvent::Connected(stream));
                return;
            }
            Err(e) => debug!(%addr, "Direct candidate failed: {e}"),
        }
    }
    let _ = events.send(ConnectorEvent::Error("no reachable candidate".to_string()));
}

#[async_trait]
impl PeerConnector for DirectConnector {
    type Transport = TcpStream;

    async fn next_event(&mut self) -> Option<ConnectorEvent<TcpStream>> {
        self.events_rx.recv().await
    }

    async fn signal(&mut self, message: SignalMessage) -> Result<(), SignalingError> {
        match (self.role, message) {
            (SignalRole::Offer, SignalMessage::Answer { .. }) => Ok(()),
            (SignalRole::Offer, SignalMessage::Candidate { .. }) => Ok(()),
            (SignalRole::Answer, SignalMessage::Offer { sdp }) => {
                if self.candidates.is_some() {
                    return Err(SignalingError::Connector(Cow::Borrowed("duplicate offer")));
                }
                let token = parse_offer(&sdp).ok_or_else(|| {
                    SignalingError::Connector(Cow::Owned(format!("unsupported offer: {sdp}")))
                })?;
                self.start_answer(token);
                Ok(())
            }
            (SignalRole::Answer, SignalMessage::Candidate { candidate }) => {
                let Some(candidates) = &self.candidates else {
                    return Err(SignalingError::Connector(Cow::Borrowed(
                        "candidate before offer",
                    )));
                };
                if candidate.is_empty() {
                    self.candidates = None;
                } else if let Some(addr) = parse_candidate(&candidate) {
                    let _ = candidates.send(addr);
                } else {
                    trace!(%candidate, "Ignoring unsupported candidate");
                }
                Ok(())
            }
            (role, message) => Err(SignalingError::Connector(Cow::Owned(format!(
                "{role:?} side cannot accept {message:?}"
            )))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> DirectConfig {
        DirectConfig {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            ..DirectConfig::default()
        }
    }

    async fn drain_signals(connector: &mut DirectConnector) -> Vec<SignalMessage> {
        let mut signals = Vec::new();
        loop {
            match connector.next_event().await {
                Some(ConnectorEvent::Signal(message)) => {
                    let done = message == SignalMessage::end_of_candidates();
                    signals.push(message);
                    if done {
                        return signals;
                    }
                }
                other => panic!("expected signals, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_candidate_format() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(parse_candidate(&format_candidate(addr)), Some(addr));
        assert_eq!(parse_candidate("udp 127.0.0.1:4000"), None);
    }

    #[test]
    fn test_offer_parse() {
        let token = [0xabu8; TOKEN_LEN];
        let sdp = format!("{DIRECT_SDP} {}", hex::encode(token));
        assert_eq!(parse_offer(&sdp), Some(token));
        assert_eq!(parse_offer("v=0"), None);
        assert_eq!(parse_offer(&format!("{DIRECT_SDP} abcd")), None);
    }

    #[test]
    fn test_advertised_defaults() {
        assert_eq!(
            DirectConfig::default().advertised(),
            vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]
        );
        assert_eq!(loopback().advertised(), vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    }

    #[tokio::test]
    async fn test_direct_offer_answer() {
        let mut offering = DirectConnector::new(SignalRole::Offer, loopback());
        let mut answering = DirectConnector::new(SignalRole::Answer, loopback());

        for signal in drain_signals(&mut offering).await {
            answering.signal(signal).await.unwrap();
        }

        let answer = match answering.next_event().await {
            Some(ConnectorEvent::Signal(answer)) => answer,
            other => panic!("expected an answer, got {other:?}"),
        };
        let mut answered = match answering.next_event().await {
            Some(ConnectorEvent::Connected(stream)) => stream,
            other => panic!("expected a connection, got {other:?}"),
        };

        offering.signal(answer).await.unwrap();
        let mut offered = match offering.next_event().await {
            Some(ConnectorEvent::Connected(stream)) => stream,
            other => panic!("expected a connection, got {other:?}"),
        };

        answered.write_all(b"over tcp").await.unwrap();
        let mut buf = [0u8; 8];
        offered.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"over tcp");
    }

    #[tokio::test]
    async fn test_unreachable_candidates_report_error() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead = probe.local_addr().unwrap();
        drop(probe);

        let mut answering = DirectConnector::new(SignalRole::Answer, loopback());
        answering
            .signal(SignalMessage::Offer {
                sdp: format!("{DIRECT_SDP} {}", hex::encode([1u8; TOKEN_LEN])),
            })
            .await
            .unwrap();
        answering
            .signal(SignalMessage::Candidate {
                candidate: format_candidate(dead),
            })
            .await
            .unwrap();
        answering
            .signal(SignalMessage::end_of_candidates())
            .await
            .unwrap();

        assert!(matches!(
            answering.next_event().await,
            Some(ConnectorEvent::Error(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_token_is_not_acknowledged() {
        let mut offering = DirectConnector::new(SignalRole::Offer, loopback());
        let signals = drain_signals(&mut offering).await;
        let addr = signals
            .iter()
            .find_map(|s| match s {
                SignalMessage::Candidate { candidate } => parse_candidate(candidate),
                _ => None,
            })
            .unwrap();

        let result = try_candidate(addr, &[0u8; TOKEN_LEN], Duration::from_millis(500)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_silent_connection_does_not_block_answerer() {
        let config = DirectConfig {
            connect_timeout: Duration::from_secs(30),
            ..loopback()
        };
        let mut offering = DirectConnector::new(SignalRole::Offer, config);
        let signals = drain_signals(&mut offering).await;
        let token = signals
            .iter()
            .find_map(|s| match s {
                SignalMessage::Offer { sdp } => parse_offer(sdp),
                _ => None,
            })
            .unwrap();
        let addr = signals
            .iter()
            .find_map(|s| match s {
                SignalMessage::Candidate { candidate } => parse_candidate(candidate),
                _ => None,
            })
            .unwrap();

        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let answered = tokio::time::timeout(
            Duration::from_secs(2),
            try_candidate(addr, &token, Duration::from_secs(30)),
        )
        .await
        .expect("answerer waited behind the silent connection");
        assert!(answered.is_ok());

        assert!(matches!(
            offering.next_event().await,
            Some(ConnectorEvent::Connected(_))
        ));
    }

    #[tokio::test]
    async fn test_candidate_before_offer_is_refused() {
        let mut answering = DirectConnector::new(SignalRole::Answer, loopback());
        assert!(
            answering
                .signal(SignalMessage::Candidate {
                    candidate: "tcp 127.0.0.1:1".into(),
                })
                .await
                .is_err()
        );
    }
}
