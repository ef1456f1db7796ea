//! # kindred Discovery
//!
//! Rendezvous layer for kindred.
//!
//! This crate provides:
//! - Friend discovery topics derived from identity public keys
//! - The [`Swarm`] contract the connection orchestrator drives
//! - An in-process rendezvous ([`MemoryRendezvous`]) for tests and demos
//! - A static-peer TCP rendezvous ([`TcpSwarm`])
//!
//! ## Example
//!
//! ```rust
//! use kindred_crypto::Identity;
//! use kindred_discovery::topic_for;
//!
//! let identity = Identity::from_seed(&[1u8; 32]);
//! let topic = topic_for(&identity.public_identity());
//! assert_eq!(topic.as_bytes().len(), 32);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod swarm;
pub mod tcp;
pub mod topic;

pub use memory::{MemoryRendezvous, MemorySwarm};
pub use swarm::{JoinOptions, Swarm, SwarmError, SwarmEvent};
pub use tcp::{TcpSwarm, TcpSwarmConfig, TcpSwarmStream};
pub use topic::{FRIEND_DISCOVERY_SALT, Topic, topic_for};

/// Default listen port (one above Dat's default to avoid clashing with it).
pub const DEFAULT_PORT: u16 = 3283;
