//! Friend registry.
//!
//! An owned map from public identity to friend record, bounded in size.
//! When full, adding a new friend evicts the one seen least recently.
//! Recency is a logical clock bumped on every `add` and `mark_seen`, so the
//! order is exact even when two updates land in the same instant.

use kindred_crypto::PublicIdentity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of friends kept.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Registry shared between an orchestrator and its owner.
pub type SharedFriends = Arc<RwLock<FriendRegistry>>;

/// A known peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    /// Display name
    pub name: String,
    /// When the peer last authenticated with us
    pub last_seen: Option<SystemTime>,
    recency: u64,
}

/// Bounded friend registry with least-recently-seen eviction.
#[derive(Debug)]
pub struct FriendRegistry {
    friends: HashMap<PublicIdentity, Friend>,
    capacity: usize,
    clock: u64,
}

impl Default for FriendRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl FriendRegistry {
    /// Create an empty registry holding at most `capacity` friends (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            friends: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
        }
    }

    /// Wrap the registry for sharing with an orchestrator.
    #[must_use]
    pub fn into_shared(self) -> SharedFriends {
        Arc::new(RwLock::new(self))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Add or rename a friend. Returns the friend evicted to make room, if any.
    pub fn add(
        &mut self,
        identity: PublicIdentity,
        name: impl Into<String>,
    ) -> Option<(PublicIdentity, Friend)> {
        let recency = self.tick();
        let name = name.into();

        if let Some(friend) = self.friends.get_mut(&identity) {
            friend.name = name;
            friend.recency = recency;
            return None;
        }

        let evicted = if self.friends.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.friends.insert(
            identity,
            Friend {
                name,
                last_seen: None,
                recency,
            },
        );
        evicted
    }

    fn evict_oldest(&mut self) -> Option<(PublicIdentity, Friend)> {
        let oldest = *self
            .friends
            .iter()
            .min_by_key(|(_, friend)| friend.recency)?
            .0;
        let friend = self.friends.remove(&oldest)?;
        debug!(peer = %oldest.short(), "Evicted least recently seen friend");
        Some((oldest, friend))
    }

    /// Remove a friend.
    pub fn remove(&mut self, identity: &PublicIdentity) -> Option<Friend> {
        self.friends.remove(identity)
    }

    /// Look up a friend.
    #[must_use]
    pub fn get(&self, identity: &PublicIdentity) -> Option<&Friend> {
        self.friends.get(identity)
    }

    /// Whether `identity` is a friend.
    #[must_use]
    pub fn contains(&self, identity: &PublicIdentity) -> bool {
        self.friends.contains_key(identity)
    }

    /// Record that a friend just authenticated. Returns false for strangers.
    pub fn mark_seen(&mut self, identity: &PublicIdentity) -> bool {
        let recency = self.tick();
        match self.friends.get_mut(identity) {
            Some(friend) => {
                friend.last_seen = Some(SystemTime::now());
                friend.recency = recency;
                true
            }
            None => false,
        }
    }

    /// Iterate over all friends in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&PublicIdentity, &Friend)> {
        self.friends.iter()
    }

    /// Number of friends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.friends.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.friends.is_empty()
    }

    /// Maximum number of friends kept.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
