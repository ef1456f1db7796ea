//! Fuzz target for the dialing side of the handshake
//!
//! A host that does not hold the target's private key must never get the
//! initiator to report success.

#![no_main]

use kindred_core::handshake::{Initiator, Transition};
use kindred_crypto::Identity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|messages: Vec<Vec<u8>>| {
    let guest = Identity::from_seed(&[1u8; 32]);
    let host = Identity::from_seed(&[2u8; 32]).public_identity();

    let Ok((mut initiator, _request)) = Initiator::start(&guest, host) else {
        return;
    };
    initiator.request_sent();

    for message in &messages {
        match initiator.handle(message) {
            Transition::Complete { .. } => panic!("impostor host accepted"),
            Transition::Rejected(_) => return,
            Transition::Pending | Transition::Send(_) => {}
        }
    }
});
