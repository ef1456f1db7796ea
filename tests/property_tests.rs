//! Property-based tests for kindred
//!
//! Uses proptest to verify handshake and framing invariants across large
//! input spaces.

use proptest::prelude::*;

// ============================================================================
// Handshake Properties
// ============================================================================

mod handshake_properties {
    use super::*;
    use kindred_core::handshake::{
        Initiator, Responder, ResponderPhase, SUCCESS_MARKER, Transition,
    };
    use kindred_crypto::Identity;

    fn challenge_for(host: &Identity, guest: &Identity) -> (Initiator, Responder, Vec<u8>) {
        let (mut initiator, request) = Initiator::start(guest, host.public_identity()).unwrap();
        initiator.request_sent();
        let mut responder = Responder::new(host);
        let Transition::Send(challenge) = responder.handle(&request) else {
            panic!("no challenge");
        };
        (initiator, responder, challenge)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Honest parties always authenticate, and the host learns exactly
        /// the guest's identity.
        #[test]
        fn honest_parties_authenticate(
            host_seed in any::<[u8; 32]>(),
            guest_seed in any::<[u8; 32]>(),
        ) {
            let host = Identity::from_seed(&host_seed);
            let guest = Identity::from_seed(&guest_seed);
            let (mut initiator, mut responder, challenge) = challenge_for(&host, &guest);

            let Transition::Send(echo) = initiator.handle(&challenge) else {
                panic!("no echo");
            };
            let Transition::Complete { reply: Some(marker), peer } = responder.handle(&echo) else {
                panic!("host did not authenticate");
            };
            prop_assert_eq!(peer, guest.public_identity());
            prop_assert_eq!(marker.as_slice(), SUCCESS_MARKER);

            let verdict = initiator.handle(&marker);
            let authenticated_host = matches!(
                verdict,
                Transition::Complete { peer, .. } if peer == host.public_identity()
            );
            prop_assert!(authenticated_host);
        }

        /// A corrupted auth request is dropped silently; the host keeps
        /// waiting for a valid one.
        #[test]
        fn corrupted_request_is_ignored(index in 0usize..80, flip in 1u8..=255) {
            let host = Identity::from_seed(&[1u8; 32]);
            let guest = Identity::from_seed(&[2u8; 32]);
            let (_, mut request) = Initiator::start(&guest, host.public_identity()).unwrap();
            request[index] ^= flip;

            let mut responder = Responder::new(&host);
            prop_assert_eq!(responder.handle(&request), Transition::Pending);
            prop_assert_eq!(responder.phase(), ResponderPhase::AwaitingRequest);
        }

        /// Any bit flipped in the challenge echo rejects the session without
        /// the success marker.
        #[test]
        fn corrupted_echo_is_rejected(index in 0usize..72, bit in 0u8..8) {
            let host = Identity::from_seed(&[3u8; 32]);
            let guest = Identity::from_seed(&[4u8; 32]);
            let (mut initiator, mut responder, challenge) = challenge_for(&host, &guest);

            let Transition::Send(mut echo) = initiator.handle(&challenge) else {
                panic!("no echo");
            };
            echo[index] ^= 1 << bit;

            let rejected = matches!(responder.handle(&echo), Transition::Rejected(_));
            prop_assert!(rejected);
            prop_assert_eq!(responder.phase(), ResponderPhase::Rejected);
        }

        /// Random bytes never pass as a challenge echo.
        #[test]
        fn random_echo_is_rejected(echo in prop::collection::vec(any::<u8>(), 0..128)) {
            let host = Identity::from_seed(&[5u8; 32]);
            let guest = Identity::from_seed(&[6u8; 32]);
            let (_, mut responder, _) = challenge_for(&host, &guest);

            let rejected = matches!(responder.handle(&echo), Transition::Rejected(_));
            prop_assert!(rejected);
        }
    }
}

// ============================================================================
// Topic Properties
// ============================================================================

mod topic_properties {
    use super::*;
    use kindred_crypto::Identity;
    use kindred_discovery::topic_for;

    proptest! {
        /// Distinct identities map to distinct topics, and a topic never
        /// equals the identity it was derived from.
        #[test]
        fn topics_are_distinct(a in any::<[u8; 32]>(), b in any::<[u8; 32]>()) {
            prop_assume!(a != b);
            let a = Identity::from_seed(&a).public_identity();
            let b = Identity::from_seed(&b).public_identity();

            prop_assert_ne!(topic_for(&a), topic_for(&b));
            let topic_a = topic_for(&a);
            prop_assert_ne!(topic_a.as_bytes(), a.as_bytes());
        }
    }
}

// ============================================================================
// Signaling Framing Properties
// ============================================================================

mod signaling_properties {
    use super::*;
    use kindred_core::SignalMessage;
    use kindred_core::framing::{DEFAULT_MAX_FRAME_LEN, FrameDecoder, encode_frame};

    fn signal_message() -> impl Strategy<Value = SignalMessage> {
        prop_oneof![
            ".*".prop_map(|sdp| SignalMessage::Offer { sdp }),
            ".*".prop_map(|sdp| SignalMessage::Answer { sdp }),
            ".*".prop_map(|candidate| SignalMessage::Candidate { candidate }),
        ]
    }

    proptest! {
        /// Signaling units written back to back decode to the same units in
        /// order, however the byte stream is split across reads. Payloads may
        /// contain any character, including the old `;` delimiter.
        #[test]
        fn units_survive_any_split(
            messages in prop::collection::vec(signal_message(), 1..6),
            split_seed in any::<u64>(),
        ) {
            let mut wire = Vec::new();
            for message in &messages {
                let payload = serde_json::to_vec(message).unwrap();
                wire.extend_from_slice(&encode_frame(&payload).unwrap());
            }

            let split = usize::try_from(split_seed % (wire.len() as u64 + 1)).unwrap();
            let mut decoder = FrameDecoder::new(DEFAULT_MAX_FRAME_LEN);
            let mut frames = decoder.decode(&wire[..split]).unwrap();
            frames.extend(decoder.decode(&wire[split..]).unwrap());

            let decoded: Vec<SignalMessage> = frames
                .iter()
                .map(|frame| serde_json::from_slice(frame).unwrap())
                .collect();
            prop_assert_eq!(decoded, messages);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
