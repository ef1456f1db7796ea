//! End-to-end tests over the in-memory rendezvous.
//!
//! Each test runs full serve and dial loops: topic derivation, the
//! handshake over swarm streams, signaling handoff and the resulting direct
//! transport.

use kindred_core::framing::{DEFAULT_MAX_FRAME_LEN, FrameStream};
use kindred_core::handshake::CHALLENGE_MESSAGE_SIZE;
use kindred_core::{ChatChannel, ChatMessage, DialError, NodeConfig, ServeEvent, SessionError};
use kindred_crypto::Identity;
use kindred_crypto::random::fill_random;
use kindred_discovery::{JoinOptions, Swarm, SwarmEvent, topic_for};
use kindred_integration_tests::fixtures::{TwoNodeFixture, fixture_config};
use rand_core::OsRng;
use std::time::Duration;

// ============================================================================
// Session Establishment
// ============================================================================

/// A dials B: the dial resolves with B's identity and B's serve loop reports A.
#[tokio::test]
async fn test_dial_resolves_with_host_and_serve_reports_guest() {
    let fixture = TwoNodeFixture::new();
    let (dialed, accepted) = fixture.establish().await;

    assert_eq!(dialed.peer, fixture.host.public_identity());
    assert_eq!(accepted.peer, fixture.guest.public_identity());
}

/// The direct transports returned on both sides are connected to each other.
#[tokio::test]
async fn test_chat_over_established_transport() {
    let fixture = TwoNodeFixture::new();
    let (dialed, accepted) = fixture.establish().await;

    let mut guest = ChatChannel::new(dialed.transport);
    let mut host = ChatChannel::new(accepted.transport);

    guest.send(&ChatMessage::now("hello; are you there?")).await.unwrap();
    let received = host.recv().await.unwrap().unwrap();
    assert_eq!(received.text, "hello; are you there?");

    host.send(&ChatMessage::now("yes")).await.unwrap();
    assert_eq!(guest.recv().await.unwrap().unwrap().text, "yes");
}

/// The host can be dialed before it starts serving.
#[tokio::test]
async fn test_dial_before_host_serves() {
    let fixture = TwoNodeFixture::new();
    let dialing = fixture.dial(fixture.host.public_identity());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut serving = fixture.serve();

    let dialed = dialing.await.unwrap();
    assert_eq!(dialed.peer, fixture.host.public_identity());
    assert_eq!(
        serving.next_session().await.unwrap().peer,
        fixture.guest.public_identity()
    );
}

/// One serve loop handles several guests at once.
#[tokio::test]
async fn test_concurrent_guests() {
    let fixture = TwoNodeFixture::new();
    let mut serving = fixture.serve();

    let others: Vec<_> = (0..3)
        .map(|_| {
            kindred_core::Orchestrator::new(Identity::generate(&mut OsRng), fixture_config())
                .unwrap()
        })
        .collect();
    let dials: Vec<_> = others
        .iter()
        .map(|guest| {
            guest.dial(
                fixture.host.public_identity(),
                fixture.rendezvous.swarm(),
                fixture.connectors(),
            )
        })
        .collect();

    for dial in dials {
        assert_eq!(dial.await.unwrap().peer, fixture.host.public_identity());
    }

    let mut accepted = Vec::new();
    for _ in 0..3 {
        accepted.push(serving.next_session().await.unwrap().peer);
    }
    for guest in &others {
        assert!(accepted.contains(&guest.public_identity()));
    }
}

/// Dialing your own identity reaches your own serve loop.
#[tokio::test]
async fn test_self_dial() {
    let fixture = TwoNodeFixture::new();
    let mut serving = fixture.serve();

    let dialed = fixture
        .host
        .dial(
            fixture.host.public_identity(),
            fixture.rendezvous.swarm(),
            fixture.connectors(),
        )
        .await
        .unwrap();

    assert_eq!(dialed.peer, fixture.host.public_identity());
    assert_eq!(
        serving.next_session().await.unwrap().peer,
        fixture.host.public_identity()
    );
}

// ============================================================================
// Rejected Candidates
// ============================================================================

/// An impostor on the host's topic answers the auth request with a forged
/// challenge. The guest rejects that candidate and still reaches the real host.
#[tokio::test]
async fn test_impostor_candidate_is_skipped() {
    let fixture = TwoNodeFixture::new();
    let host_topic = topic_for(&fixture.host.public_identity());

    let mut impostor = fixture.rendezvous.swarm();
    impostor
        .join(host_topic, JoinOptions::default())
        .await
        .unwrap();
    let impostor_task = tokio::spawn(async move {
        let Some(SwarmEvent::Connection(stream)) = impostor.next_event().await else {
            panic!("impostor saw no candidate");
        };
        let mut stream = FrameStream::new(stream, DEFAULT_MAX_FRAME_LEN);
        let _request = stream.read_frame().await.unwrap();
        let mut forged = [0u8; CHALLENGE_MESSAGE_SIZE];
        fill_random(&mut forged).unwrap();
        stream.write_frame(&forged).await.unwrap();
        // Hold the stream until the guest gives up on it.
        let _ = stream.read_frame().await;
        impostor
    });

    let dialing = fixture.dial(fixture.host.public_identity());
    let _impostor = impostor_task.await.unwrap();

    let mut serving = fixture.serve();
    let dialed = dialing.await.unwrap();
    assert_eq!(dialed.peer, fixture.host.public_identity());
    assert_eq!(
        serving.next_session().await.unwrap().peer,
        fixture.guest.public_identity()
    );
}

/// A candidate that sends garbage to the host is reported as rejected and the
/// host keeps serving.
#[tokio::test]
async fn test_host_survives_silent_candidate() {
    let fixture = TwoNodeFixture::new();
    let mut serving = fixture.serve();
    assert!(matches!(
        serving.next_event().await,
        Some(ServeEvent::Listening { .. })
    ));

    let mut prober = fixture.rendezvous.swarm();
    prober
        .join(
            topic_for(&fixture.host.public_identity()),
            JoinOptions {
                announce: false,
                lookup: true,
            },
        )
        .await
        .unwrap();
    let Some(SwarmEvent::Connection(stream)) = prober.next_event().await else {
        panic!("prober saw no candidate");
    };
    let mut stream = FrameStream::new(stream, DEFAULT_MAX_FRAME_LEN);
    stream.write_frame(b"GET / HTTP/1.1").await.unwrap();

    match serving.next_event().await {
        Some(ServeEvent::Rejected {
            error: SessionError::Handshake(error),
        }) => assert!(error.is_timeout()),
        other => panic!("expected a rejected candidate, got {other:?}"),
    }

    let dialed = fixture.dial(fixture.host.public_identity()).await.unwrap();
    assert_eq!(dialed.peer, fixture.host.public_identity());
}

// ============================================================================
// Dial Outcomes
// ============================================================================

/// Cancelling a dial rejects it and releases the target topic.
#[tokio::test]
async fn test_cancel_dial_leaves_topic() {
    let fixture = TwoNodeFixture::new();
    let target = Identity::generate(&mut OsRng).public_identity();
    let topic = topic_for(&target);

    let mut dialing = fixture.dial(target);
    while fixture.rendezvous.members(&topic) == 0 {
        tokio::task::yield_now().await;
    }

    dialing.cancel();
    assert!(matches!(dialing.await, Err(DialError::Cancelled)));
    assert_eq!(fixture.rendezvous.members(&topic), 0);
}

/// A dial with a deadline and nobody serving times out.
#[tokio::test]
async fn test_dial_times_out() {
    let guest_config = NodeConfig {
        dial_timeout: Some(Duration::from_millis(100)),
        ..fixture_config()
    };
    let fixture = TwoNodeFixture::with_configs(fixture_config(), guest_config);

    let result = fixture.dial(fixture.host.public_identity()).await;
    assert!(matches!(result, Err(DialError::TimedOut)));
}

/// Dialing the wrong identity never authenticates against the host.
#[tokio::test]
async fn test_wrong_target_is_not_reached() {
    let guest_config = NodeConfig {
        dial_timeout: Some(Duration::from_millis(300)),
        ..fixture_config()
    };
    let fixture = TwoNodeFixture::with_configs(fixture_config(), guest_config);
    let mut serving = fixture.serve();

    let stranger = Identity::generate(&mut OsRng).public_identity();
    assert!(matches!(
        fixture.dial(stranger).await,
        Err(DialError::TimedOut)
    ));

    serving.cancel();
    while let Some(event) = serving.next_event().await {
        assert!(!matches!(event, ServeEvent::Session(_)));
    }
}
