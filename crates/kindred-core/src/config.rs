//! Node configuration

use crate::error::ConfigError;
use crate::framing::DEFAULT_MAX_FRAME_LEN;
use crate::handshake::MAX_HANDSHAKE_MESSAGE;
use kindred_discovery::DEFAULT_PORT;
use std::borrow::Cow;
use std::time::Duration;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Rendezvous port to listen on. Falls back to an OS-assigned port if
    /// this one cannot be bound.
    pub listen_port: u16,

    /// Announce on our own topic while serving
    pub announce: bool,

    /// Time allowed for each handshake step
    pub handshake_step_timeout: Duration,

    /// Time allowed for the signaling handoff after authentication
    pub signaling_timeout: Duration,

    /// Overall limit for a `dial` call (none waits until cancelled)
    pub dial_timeout: Option<Duration>,

    /// Largest frame accepted on a rendezvous stream
    pub max_frame_len: usize,

    /// Accept authenticated peers that are not in the friend registry
    pub accept_strangers: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            announce: true,
            handshake_step_timeout: Duration::from_secs(10),
            signaling_timeout: Duration::from_secs(30),
            dial_timeout: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            accept_strangers: true,
        }
    }
}

impl NodeConfig {
    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout or a frame limit
    /// that cannot carry a handshake message.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_step_timeout.is_zero() {
            return Err(ConfigError::Invalid(Cow::Borrowed(
                "handshake_step_timeout must be non-zero",
            )));
        }
        if self.signaling_timeout.is_zero() {
            return Err(ConfigError::Invalid(Cow::Borrowed(
                "signaling_timeout must be non-zero",
            )));
        }
        if self.dial_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid(Cow::Borrowed(
                "dial_timeout must be non-zero when set",
            )));
        }
        if self.max_frame_len < MAX_HANDSHAKE_MESSAGE {
            return Err(ConfigError::Invalid(Cow::Owned(format!(
                "max_frame_len must be at least {MAX_HANDSHAKE_MESSAGE} bytes"
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_port, 3283);
        assert!(config.announce);
        assert!(config.accept_strangers);
        assert_eq!(config.dial_timeout, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = NodeConfig {
            handshake_step_timeout: Duration::ZERO,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            signaling_timeout: Duration::ZERO,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            dial_timeout: Some(Duration::ZERO),
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frame_limit_must_fit_handshake() {
        let config = NodeConfig {
            max_frame_len: MAX_HANDSHAKE_MESSAGE - 1,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = NodeConfig {
            max_frame_len: MAX_HANDSHAKE_MESSAGE,
            ..NodeConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
