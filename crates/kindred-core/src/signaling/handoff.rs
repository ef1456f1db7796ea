//! Relay loop between a connector and an authenticated stream.

use super::{ConnectorEvent, PeerConnector, SignalMessage};
use crate::error::SignalingError;
use crate::framing::FrameStream;
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Relay signaling between `connector` and the remote side over `stream`
/// until the connector reports a live transport.
///
/// If the stream closes first, the loop keeps waiting on the connector: the
/// remote side drops its end of the stream as soon as its own transport is
/// live, which may be before ours is.
///
/// # Errors
///
/// Returns [`SignalingError::Timeout`] if no transport is live within
/// `timeout`, [`SignalingError::Malformed`] for an undecodable unit,
/// [`SignalingError::Frame`] for a framing violation, or
/// [`SignalingError::Connector`] if the connector fails.
pub async fn handoff<S, C>(
    stream: &mut FrameStream<S>,
    mut connector: C,
    timeout: Duration,
) -> Result<C::Transport, SignalingError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: PeerConnector,
{
    let deadline = Instant::now() + timeout;
    let mut stream_open = true;

    loop {
        tokio::select! {
            event = connector.next_event() => match event {
                Some(ConnectorEvent::Signal(message)) => {
                    if stream_open {
                        let payload = serde_json::to_vec(&message)?;
                        if let Err(e) = stream.write_frame(&payload).await {
                            trace!("Could not relay signaling unit: {e}");
                            stream_open = false;
                        }
                    }
                }
                Some(ConnectorEvent::Connected(transport)) => {
                    debug!("Direct transport connected");
                    return Ok(transport);
                }
                Some(ConnectorEvent::Error(e)) => {
                    return Err(SignalingError::Connector(Cow::Owned(e)));
                }
                None => {
                    return Err(SignalingError::Connector(Cow::Borrowed("connector stopped")));
                }
            },
            frame = stream.read_frame(), if stream_open => match frame {
                Ok(Some(payload)) => {
                    let message: SignalMessage = serde_json::from_slice(&payload)?;
                    trace!(?message, "Signaling unit received");
                    connector.signal(message).await?;
                }
                Ok(None) => {
                    trace!("Rendezvous stream closed during signaling");
                    stream_open = false;
                }
                Err(e) => return Err(e.into()),
            },
            () = tokio::time::sleep_until(deadline) => return Err(SignalingError::Timeout),
        }
    }
}
