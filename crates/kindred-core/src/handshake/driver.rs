//! Async drivers running the handshake engines over a framed stream.
//!
//! Each phase gets its own deadline. Input the Responder ignores while
//! waiting for a request does not extend the deadline.

use super::{Initiator, Responder, Transition};
use crate::error::HandshakeError;
use crate::framing::FrameStream;
use kindred_crypto::{Identity, PublicIdentity};
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, info};

async fn read_step<S>(
    stream: &mut FrameStream<S>,
    deadline: Instant,
    waiting_for: &'static str,
) -> Result<Vec<u8>, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout_at(deadline, stream.read_frame()).await {
        Err(_) => Err(HandshakeError::Timeout(waiting_for)),
        Ok(Err(e)) => Err(e.into()),
        Ok(Ok(None)) => Err(HandshakeError::Transport(Cow::Borrowed(
            "stream closed mid-handshake",
        ))),
        Ok(Ok(Some(frame))) => Ok(frame),
    }
}

async fn write_step<S>(
    stream: &mut FrameStream<S>,
    message: &[u8],
    step_timeout: Duration,
) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(step_timeout, stream.write_frame(message)).await {
        Err(_) => Err(HandshakeError::Timeout("sending")),
        Ok(result) => result.map_err(Into::into),
    }
}

/// Run the Responder over `stream`, returning the proven peer identity.
///
/// # Errors
///
/// Returns the [`HandshakeError`] that ended the session. The caller should
/// drop the stream.
pub async fn respond<S>(
    stream: &mut FrameStream<S>,
    identity: &Identity,
    step_timeout: Duration,
) -> Result<PublicIdentity, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut responder = Responder::new(identity);
    let mut deadline = Instant::now() + step_timeout;
    let mut waiting_for = "awaiting auth request";

    loop {
        let message = read_step(stream, deadline, waiting_for).await?;
        match responder.handle(&message) {
            Transition::Pending => {}
            Transition::Send(reply) => {
                write_step(stream, &reply, step_timeout).await?;
                deadline = Instant::now() + step_timeout;
                waiting_for = "awaiting challenge response";
            }
            Transition::Complete { reply, peer } => {
                if let Some(reply) = reply {
                    write_step(stream, &reply, step_timeout).await?;
                }
                info!(peer = %peer.short(), "Authenticated peer");
                return Ok(peer);
            }
            Transition::Rejected(error) => return Err(error),
        }
    }
}

/// Run the Initiator against `host` over `stream`.
///
/// # Errors
///
/// Returns the [`HandshakeError`] that ended the session. The caller should
/// drop the stream.
pub async fn initiate<S>(
    stream: &mut FrameStream<S>,
    identity: &Identity,
    host: PublicIdentity,
    step_timeout: Duration,
) -> Result<PublicIdentity, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut initiator, request) = Initiator::start(identity, host)?;
    write_step(stream, &request, step_timeout).await?;
    initiator.request_sent();
    debug!(host = %host.short(), "Auth request sent");

    loop {
        let deadline = Instant::now() + step_timeout;
        let message = match tokio::time::timeout_at(deadline, stream.read_frame()).await {
            Err(_) => return Err(initiator.time_out()),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(None)) => {
                return Err(HandshakeError::Transport(Cow::Borrowed(
                    "stream closed mid-handshake",
                )));
            }
            Ok(Ok(Some(frame))) => frame,
        };

        match initiator.handle(&message) {
            Transition::Pending => {}
            Transition::Send(echo) => write_step(stream, &echo, step_timeout).await?,
            Transition::Complete { peer, .. } => {
                info!(host = %peer.short(), "Authenticated with host");
                return Ok(peer);
            }
            Transition::Rejected(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::DEFAULT_MAX_FRAME_LEN;
    use rand_core::OsRng;

    fn streams() -> (
        FrameStream<tokio::io::DuplexStream>,
        FrameStream<tokio::io::DuplexStream>,
    ) {
        let (a, b) = tokio::io::duplex(4096);
        (
            FrameStream::new(a, DEFAULT_MAX_FRAME_LEN),
            FrameStream::new(b, DEFAULT_MAX_FRAME_LEN),
        )
    }

    #[tokio::test]
    async fn test_drivers_authenticate_over_loopback() {
        let host = Identity::generate(&mut OsRng);
        let guest = Identity::generate(&mut OsRng);
        let (mut host_stream, mut guest_stream) = streams();
        let step = Duration::from_secs(5);

        let host_id = host.public_identity();
        let (responded, initiated) = tokio::join!(
            respond(&mut host_stream, &host, step),
            initiate(&mut guest_stream, &guest, host_id, step),
        );

        assert_eq!(responded.unwrap(), guest.public_identity());
        assert_eq!(initiated.unwrap(), host.public_identity());
    }

    #[tokio::test]
    async fn test_responder_ignores_noise_before_request() {
        let host = Identity::generate(&mut OsRng);
        let guest = Identity::generate(&mut OsRng);
        let (mut host_stream, mut guest_stream) = streams();
        let step = Duration::from_secs(5);

        guest_stream.write_frame(b"not a handshake").await.unwrap();

        let host_id = host.public_identity();
        let (responded, initiated) = tokio::join!(
            respond(&mut host_stream, &host, step),
            initiate(&mut guest_stream, &guest, host_id, step),
        );

        assert_eq!(responded.unwrap(), guest.public_identity());
        assert!(initiated.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiator_times_out_on_silent_host() {
        let guest = Identity::generate(&mut OsRng);
        let host = Identity::generate(&mut OsRng).public_identity();
        let (_host_stream, mut guest_stream) = streams();

        let err = initiate(&mut guest_stream, &guest, host, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::Timeout("awaiting challenge"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_times_out_despite_noise() {
        let host = Identity::generate(&mut OsRng);
        let (mut host_stream, mut noisy) = streams();

        let noise = tokio::spawn(async move {
            for _ in 0..100 {
                if noisy.write_frame(b"noise").await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });

        let err = respond(&mut host_stream, &host, Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err, HandshakeError::Timeout("awaiting auth request"));
        noise.abort();
    }

    #[tokio::test]
    async fn test_closed_stream_is_transport_error() {
        let host = Identity::generate(&mut OsRng);
        let (mut host_stream, guest_stream) = streams();
        drop(guest_stream);

        let err = respond(&mut host_stream, &host, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Transport(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_malformed() {
        let host = Identity::generate(&mut OsRng);
        let (a, b) = tokio::io::duplex(4096);
        let mut host_stream = FrameStream::new(a, 128);
        let mut guest_stream = FrameStream::new(b, 1024);

        guest_stream.write_frame(&[0u8; 512]).await.unwrap();

        let err = respond(&mut host_stream, &host, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::MalformedInput(_)));
    }
}
