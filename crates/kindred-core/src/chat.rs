//! Line chat over a direct transport.
//!
//! Each message is a JSON object inside one length-prefixed frame.

use crate::error::ChatError;
use crate::framing::{DEFAULT_MAX_FRAME_LEN, FrameStream};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message text
    pub text: String,
    /// Sender's clock when sent, in milliseconds since the Unix epoch
    pub sent_at_ms: u64,
}

impl ChatMessage {
    /// Create a message stamped with the current time.
    #[must_use]
    pub fn now(text: impl Into<String>) -> Self {
        let sent_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self {
            text: text.into(),
            sent_at_ms,
        }
    }
}

/// Chat channel over a direct transport.
pub struct ChatChannel<T> {
    stream: FrameStream<T>,
}

impl<T> ChatChannel<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected transport.
    pub fn new(transport: T) -> Self {
        Self {
            stream: FrameStream::new(transport, DEFAULT_MAX_FRAME_LEN),
        }
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] if the message cannot be encoded or written.
    pub async fn send(&mut self, message: &ChatMessage) -> Result<(), ChatError> {
        let payload = serde_json::to_vec(message)?;
        self.stream.write_frame(&payload).await?;
        Ok(())
    }

    /// Receive the next message. Returns `None` once the peer hangs up.
    ///
    /// Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError`] for a malformed message or a failed read.
    pub async fn recv(&mut self) -> Result<Option<ChatMessage>, ChatError> {
        match self.stream.read_frame().await? {
            Some(payload) => Ok(Some(serde_json::from_slice(&payload)?)),
            None => Ok(None),
        }
    }

    /// Close our side of the channel.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Frame`] if the shutdown fails.
    pub async fn close(&mut self) -> Result<(), ChatError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::encode_frame;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_send_recv() {
        let (a, b) = tokio::io::duplex(1024);
        let mut alice = ChatChannel::new(a);
        let mut bob = ChatChannel::new(b);

        let hello = ChatMessage::now("hi bob");
        alice.send(&hello).await.unwrap();
        alice.send(&ChatMessage::now("still there?")).await.unwrap();

        assert_eq!(bob.recv().await.unwrap(), Some(hello));
        assert_eq!(bob.recv().await.unwrap().unwrap().text, "still there?");
    }

    #[tokio::test]
    async fn test_recv_after_hangup() {
        let (a, b) = tokio::io::duplex(1024);
        let mut alice = ChatChannel::new(a);
        let mut bob = ChatChannel::new(b);

        alice.close().await.unwrap();
        assert_eq!(bob.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let (mut raw, b) = tokio::io::duplex(1024);
        let mut bob = ChatChannel::new(b);

        raw.write_all(&encode_frame(b"{\"text\":1}").unwrap())
            .await
            .unwrap();
        assert!(matches!(bob.recv().await, Err(ChatError::Json(_))));
    }

    #[test]
    fn test_wire_format() {
        let message = ChatMessage {
            text: "hello; world".to_string(),
            sent_at_ms: 5,
        };
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"text":"hello; world","sent_at_ms":5}"#
        );
    }
}
