//! Two-node test fixture for integration testing
//!
//! Provides a host and a guest sharing an in-memory rendezvous and an
//! in-memory signaling hub:
//! - The host serves on its own topic
//! - The guest dials the host
//!
//! # Example
//!
//! ```ignore
//! use kindred_integration_tests::fixtures::TwoNodeFixture;
//!
//! #[tokio::test]
//! async fn test_meet() {
//!     let fixture = TwoNodeFixture::new();
//!     let (dialed, accepted) = fixture.establish().await;
//!     assert_eq!(dialed.peer, fixture.host.public_identity());
//!     assert_eq!(accepted.peer, fixture.guest.public_identity());
//! }
//! ```

use kindred_core::signaling::{MemoryConnector, MemoryConnectorHub, SignalRole};
use kindred_core::{DialHandle, NodeConfig, Orchestrator, PeerSession, ServeHandle};
use kindred_crypto::{Identity, PublicIdentity};
use kindred_discovery::MemoryRendezvous;
use rand_core::OsRng;
use std::time::Duration;
use tokio::io::DuplexStream;

/// Handshake step timeout used by fixtures. Short so that stalled
/// candidates fail quickly.
pub const FIXTURE_STEP_TIMEOUT: Duration = Duration::from_millis(500);

/// Configuration used by fixtures.
#[must_use]
pub fn fixture_config() -> NodeConfig {
    NodeConfig {
        handshake_step_timeout: FIXTURE_STEP_TIMEOUT,
        signaling_timeout: Duration::from_secs(5),
        ..NodeConfig::default()
    }
}

/// Host and guest on a shared in-memory rendezvous.
pub struct TwoNodeFixture {
    /// Shared rendezvous
    pub rendezvous: MemoryRendezvous,
    /// Shared signaling hub
    pub signaling: MemoryConnectorHub,
    /// Serving node
    pub host: Orchestrator,
    /// Dialing node
    pub guest: Orchestrator,
}

impl Default for TwoNodeFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoNodeFixture {
    /// Fresh identities with the fixture configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_configs(fixture_config(), fixture_config())
    }

    /// Fresh identities with explicit configurations.
    ///
    /// # Panics
    ///
    /// Panics if either configuration is invalid.
    #[must_use]
    pub fn with_configs(host: NodeConfig, guest: NodeConfig) -> Self {
        Self {
            rendezvous: MemoryRendezvous::new(),
            signaling: MemoryConnectorHub::new(),
            host: Orchestrator::new(Identity::generate(&mut OsRng), host)
                .expect("valid host config"),
            guest: Orchestrator::new(Identity::generate(&mut OsRng), guest)
                .expect("valid guest config"),
        }
    }

    /// Connector factory on the shared signaling hub.
    #[must_use]
    pub fn connectors(&self) -> impl Fn(SignalRole) -> MemoryConnector + Send + Sync + 'static {
        let hub = self.signaling.clone();
        move |role| hub.connector(role)
    }

    /// Start the host's serve loop.
    #[must_use]
    pub fn serve(&self) -> ServeHandle<DuplexStream> {
        self.host.serve(self.rendezvous.swarm(), self.connectors())
    }

    /// Dial `target` from the guest.
    #[must_use]
    pub fn dial(&self, target: PublicIdentity) -> DialHandle<DuplexStream> {
        self.guest
            .dial(target, self.rendezvous.swarm(), self.connectors())
    }

    /// Serve on the host, dial it from the guest, and return both sessions:
    /// `(guest's session, host's session)`.
    ///
    /// # Panics
    ///
    /// Panics if either side fails.
    pub async fn establish(&self) -> (PeerSession<DuplexStream>, PeerSession<DuplexStream>) {
        let mut serving = self.serve();
        let dialed = self
            .dial(self.host.public_identity())
            .await
            .expect("dial succeeds");
        let accepted = serving.next_session().await.expect("host accepts");
        serving.shutdown().await;
        (dialed, accepted)
    }
}
