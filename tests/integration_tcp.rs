//! End-to-end tests over real sockets: `TcpSwarm` for rendezvous and
//! `DirectConnector` for the direct transport, all on loopback.

use kindred_core::signaling::{DirectConfig, DirectConnector};
use kindred_core::{ChatChannel, ChatMessage, NodeConfig, Orchestrator, ServeEvent};
use kindred_crypto::Identity;
use kindred_discovery::{TcpSwarm, TcpSwarmConfig};
use rand_core::OsRng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn node_config() -> NodeConfig {
    NodeConfig {
        listen_port: 0,
        handshake_step_timeout: Duration::from_secs(2),
        signaling_timeout: Duration::from_secs(5),
        dial_timeout: Some(Duration::from_secs(10)),
        ..NodeConfig::default()
    }
}

fn direct_config() -> DirectConfig {
    DirectConfig {
        bind_addr: LOCALHOST,
        ..DirectConfig::default()
    }
}

fn swarm(peers: Vec<SocketAddr>) -> TcpSwarm {
    TcpSwarm::new(TcpSwarmConfig {
        bind_addr: LOCALHOST,
        peers,
        retry_interval: Duration::from_millis(100),
        ..TcpSwarmConfig::default()
    })
}

#[tokio::test]
async fn test_dial_and_chat_over_tcp() {
    let host = Orchestrator::new(Identity::generate(&mut OsRng), node_config()).unwrap();
    let guest = Orchestrator::new(Identity::generate(&mut OsRng), node_config()).unwrap();

    let mut serving = host.serve(swarm(Vec::new()), |role| {
        DirectConnector::new(role, direct_config())
    });
    let port = match serving.next_event().await {
        Some(ServeEvent::Listening { port }) => port,
        other => panic!("expected Listening, got {other:?}"),
    };
    assert_ne!(port, 0);

    let dialed = guest
        .dial(
            host.public_identity(),
            swarm(vec![SocketAddr::new(LOCALHOST, port)]),
            |role| DirectConnector::new(role, direct_config()),
        )
        .await
        .unwrap();
    assert_eq!(dialed.peer, host.public_identity());

    let accepted = serving.next_session().await.unwrap();
    assert_eq!(accepted.peer, guest.public_identity());

    let mut guest_chat = ChatChannel::new(dialed.transport);
    let mut host_chat = ChatChannel::new(accepted.transport);

    guest_chat.send(&ChatMessage::now("over tcp")).await.unwrap();
    assert_eq!(host_chat.recv().await.unwrap().unwrap().text, "over tcp");

    host_chat.send(&ChatMessage::now("loud and clear")).await.unwrap();
    assert_eq!(
        guest_chat.recv().await.unwrap().unwrap().text,
        "loud and clear"
    );

    guest_chat.close().await.unwrap();
    assert_eq!(host_chat.recv().await.unwrap(), None);

    serving.shutdown().await;
}

#[tokio::test]
async fn test_dial_waits_for_host_to_come_up() {
    // Reserve a port, then free it so the host can bind it later.
    let probe = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let host = Orchestrator::new(
        Identity::generate(&mut OsRng),
        NodeConfig {
            listen_port: port,
            ..node_config()
        },
    )
    .unwrap();
    let guest = Orchestrator::new(Identity::generate(&mut OsRng), node_config()).unwrap();

    let dialing = guest.dial(
        host.public_identity(),
        swarm(vec![SocketAddr::new(LOCALHOST, port)]),
        |role| DirectConnector::new(role, direct_config()),
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut serving = host.serve(swarm(Vec::new()), |role| {
        DirectConnector::new(role, direct_config())
    });

    let dialed = dialing.await.unwrap();
    assert_eq!(dialed.peer, host.public_identity());
    assert_eq!(
        serving.next_session().await.unwrap().peer,
        guest.public_identity()
    );
}

#[tokio::test]
async fn test_dial_retries_host_after_rejected_candidate() {
    // Something else answers on the host's port first and hangs up on the
    // guest before the real host starts serving there.
    let squatter = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = squatter.local_addr().unwrap().port();

    let host = Orchestrator::new(
        Identity::generate(&mut OsRng),
        NodeConfig {
            listen_port: port,
            ..node_config()
        },
    )
    .unwrap();
    let guest = Orchestrator::new(Identity::generate(&mut OsRng), node_config()).unwrap();

    let dialing = guest.dial(
        host.public_identity(),
        swarm(vec![SocketAddr::new(LOCALHOST, port)]),
        |role| DirectConnector::new(role, direct_config()),
    );

    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), squatter.accept())
        .await
        .unwrap()
        .unwrap();
    drop(stream);
    drop(squatter);

    let mut serving = host.serve(swarm(Vec::new()), |role| {
        DirectConnector::new(role, direct_config())
    });
    match serving.next_event().await {
        Some(ServeEvent::Listening { port: bound }) => assert_eq!(bound, port),
        other => panic!("expected Listening, got {other:?}"),
    }

    let dialed = dialing.await.unwrap();
    assert_eq!(dialed.peer, host.public_identity());
    assert_eq!(
        serving.next_session().await.unwrap().peer,
        guest.public_identity()
    );

    serving.shutdown().await;
}
