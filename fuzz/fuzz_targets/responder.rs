//! Fuzz target for the responding side of the handshake
//!
//! Whatever a stranger sends, the responder must not panic and must never
//! report an authenticated peer.

#![no_main]

use kindred_core::handshake::{Responder, Transition};
use kindred_crypto::Identity;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|messages: Vec<Vec<u8>>| {
    let host = Identity::from_seed(&[7u8; 32]);
    let mut responder = Responder::new(&host);

    for message in &messages {
        match responder.handle(message) {
            Transition::Complete { .. } => panic!("forged handshake accepted"),
            Transition::Rejected(_) => return,
            Transition::Pending | Transition::Send(_) => {}
        }
    }
});
