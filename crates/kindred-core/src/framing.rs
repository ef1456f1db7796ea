//! Length-prefixed framing for rendezvous streams.
//!
//! Every message written on a rendezvous stream, handshake steps and
//! signaling units alike, is framed as:
//!
//! ```text
//! +----------------------+---------------------------+
//! | Length (u32 BE, 4B)  | Payload (Length bytes)    |
//! +----------------------+---------------------------+
//! ```
//!
//! Payload bytes are never inspected, so any payload (including one that
//! contains what looks like a header) survives framing unchanged. A stream
//! that announces a frame above the configured limit cannot be
//! resynchronised and must be dropped.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound on a single frame payload (64 KiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 64 * 1024;

const READ_CHUNK: usize = 4096;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Declared or requested payload length exceeds the limit
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge {
        /// Declared length
        len: usize,
        /// Configured limit
        max: usize,
    },

    /// Stream ended in the middle of a frame
    #[error("stream ended with {buffered} bytes of an incomplete frame")]
    Truncated {
        /// Bytes left in the decoder
        buffered: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Frame a payload.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the payload length does not fit the
/// 32-bit prefix.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Accepts arbitrary chunks (split frames, several frames at once) and
/// yields complete payloads in order.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    /// Create a decoder rejecting payloads above `max_frame_len`.
    #[must_use]
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Append received bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pop the next complete payload, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] once a header declares a payload
    /// above the limit. The decoder keeps returning the error afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.buf[..FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        if len > self.max_frame_len {
            return Err(FrameError::TooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let total = FRAME_HEADER_LEN + len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let payload = self.buf[FRAME_HEADER_LEN..total].to_vec();
        self.buf.drain(..total);
        Ok(Some(payload))
    }

    /// Push a chunk and collect every payload it completes.
    ///
    /// # Errors
    ///
    /// See [`FrameDecoder::next_frame`].
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.push(chunk);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Bytes buffered but not yet returned.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Configured payload limit.
    #[must_use]
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

/// A byte stream carrying length-prefixed frames.
#[derive(Debug)]
pub struct FrameStream<S> {
    io: S,
    decoder: FrameDecoder,
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream.
    pub fn new(io: S, max_frame_len: usize) -> Self {
        Self {
            io,
            decoder: FrameDecoder::new(max_frame_len),
        }
    }

    /// Write one frame and flush.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] for payloads above the limit, or
    /// [`FrameError::Io`] if the write fails.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        if payload.len() > self.decoder.max_frame_len() {
            return Err(FrameError::TooLarge {
                len: payload.len(),
                max: self.decoder.max_frame_len(),
            });
        }

        let frame = encode_frame(payload)?;
        self.io.write_all(&frame).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read the next frame. Returns `None` on a clean end of stream.
    ///
    /// Cancel-safe: bytes read before cancellation stay buffered.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] for an oversized frame,
    /// [`FrameError::Truncated`] if the stream ends mid-frame, or
    /// [`FrameError::Io`] if the read fails.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }

            let n = self.io.read(&mut chunk).await?;
            if n == 0 {
                return match self.decoder.buffered() {
                    0 => Ok(None),
                    buffered => Err(FrameError::Truncated { buffered }),
                };
            }
            self.decoder.push(&chunk[..n]);
        }
    }

    /// Shut down the write half.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the shutdown fails.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.io.shutdown().await?;
        Ok(())
    }

    /// Unwrap the underlying stream, discarding buffered bytes.
    pub fn into_inner(self) -> S {
        self.io
    }
}
