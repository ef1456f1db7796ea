//! Configuration file for the kindred CLI.

use anyhow::Context;
use kindred_core::signaling::DirectConfig;
use kindred_core::{FriendRegistry, NodeConfig};
use kindred_crypto::PublicIdentity;
use kindred_discovery::{DEFAULT_PORT, TcpSwarmConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// kindred configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeSection,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkSection,
    /// Handshake timing
    #[serde(default)]
    pub handshake: HandshakeSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
    /// Known friends
    #[serde(default)]
    pub friends: Vec<FriendEntry>,
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Identity key file
    #[serde(default = "default_identity_path")]
    pub identity_file: PathBuf,
    /// Accept authenticated peers that are not listed as friends
    #[serde(default = "default_true")]
    pub accept_strangers: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Rendezvous listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Address to bind listeners on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Announce on our own topic while serving
    #[serde(default = "default_true")]
    pub announce: bool,
    /// Static rendezvous peers (`host:port`)
    #[serde(default)]
    pub peers: Vec<String>,
    /// Addresses advertised for direct connections
    #[serde(default)]
    pub advertise: Vec<String>,
}

/// Handshake timing, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeSection {
    /// Time allowed per handshake step
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    /// Time allowed for signaling after authentication
    #[serde(default = "default_signaling_timeout")]
    pub signaling_timeout_secs: u64,
    /// Overall dial limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dial_timeout_secs: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A friend entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendEntry {
    /// Display name
    pub name: String,
    /// Public identity (hex)
    pub public_key: String,
}

// Default values

fn default_identity_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("kindred/identity")
}

fn default_listen_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_step_timeout() -> u64 {
    10
}

fn default_signaling_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            identity_file: default_identity_path(),
            accept_strangers: true,
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            bind_addr: default_bind_addr(),
            announce: true,
            peers: Vec::new(),
            advertise: Vec::new(),
        }
    }
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout(),
            signaling_timeout_secs: default_signaling_timeout(),
            dial_timeout_secs: None,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("kindred/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        self.peer_addrs()?;
        self.advertised_addrs()?;
        self.friend_registry()?;
        self.node_config()?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    fn bind_addr(&self) -> anyhow::Result<IpAddr> {
        self.network
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.network.bind_addr))
    }

    fn peer_addrs(&self) -> anyhow::Result<Vec<SocketAddr>> {
        self.network
            .peers
            .iter()
            .map(|peer| {
                let addr: SocketAddr = peer
                    .parse()
                    .with_context(|| format!("rendezvous peer '{peer}' is not ip:port"))?;
                if addr.port() == 0 {
                    anyhow::bail!("rendezvous peer '{peer}' has invalid port: 0");
                }
                Ok(addr)
            })
            .collect()
    }

    fn advertised_addrs(&self) -> anyhow::Result<Vec<IpAddr>> {
        self.network
            .advertise
            .iter()
            .map(|ip| {
                ip.parse()
                    .with_context(|| format!("invalid advertised address '{ip}'"))
            })
            .collect()
    }

    /// Core node configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration does not validate.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let config = NodeConfig {
            listen_port: self.network.listen_port,
            announce: self.network.announce,
            handshake_step_timeout: Duration::from_secs(self.handshake.step_timeout_secs),
            signaling_timeout: Duration::from_secs(self.handshake.signaling_timeout_secs),
            dial_timeout: self.handshake.dial_timeout_secs.map(Duration::from_secs),
            accept_strangers: self.node.accept_strangers,
            ..NodeConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Rendezvous swarm configuration
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bind or peer address.
    pub fn tcp_swarm_config(&self) -> anyhow::Result<TcpSwarmConfig> {
        Ok(TcpSwarmConfig {
            bind_addr: self.bind_addr()?,
            peers: self.peer_addrs()?,
            ..TcpSwarmConfig::default()
        })
    }

    /// Direct connector configuration
    ///
    /// # Errors
    ///
    /// Returns an error for an unparsable bind or advertised address.
    pub fn direct_config(&self) -> anyhow::Result<DirectConfig> {
        Ok(DirectConfig {
            bind_addr: self.bind_addr()?,
            advertise: self.advertised_addrs()?,
            ..DirectConfig::default()
        })
    }

    /// Friend registry built from the `[[friends]]` entries
    ///
    /// # Errors
    ///
    /// Returns an error if a friend's public key is malformed.
    pub fn friend_registry(&self) -> anyhow::Result<FriendRegistry> {
        let mut registry = FriendRegistry::default();
        for friend in &self.friends {
            let identity = friend.identity()?;
            registry.add(identity, friend.name.clone());
        }
        Ok(registry)
    }

    /// Resolve a friend name or a hex public identity
    ///
    /// # Errors
    ///
    /// Returns an error if `target` is neither.
    pub fn resolve_peer(&self, target: &str) -> anyhow::Result<PublicIdentity> {
        if let Some(friend) = self.friends.iter().find(|f| f.name == target) {
            return friend.identity();
        }
        target
            .parse()
            .with_context(|| format!("'{target}' is neither a friend name nor a public key"))
    }

    /// Friend name for `identity`, or its short hex form
    #[must_use]
    pub fn display_name(&self, identity: &PublicIdentity) -> String {
        self.friends
            .iter()
            .find(|f| f.identity().is_ok_and(|id| id == *identity))
            .map_or_else(|| identity.short(), |f| f.name.clone())
    }
}

impl FriendEntry {
    /// Parsed public identity
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not a valid hex identity.
    pub fn identity(&self) -> anyhow::Result<PublicIdentity> {
        self.public_key
            .parse()
            .with_context(|| format!("friend '{}' has an invalid public key", self.name))
    }
}
