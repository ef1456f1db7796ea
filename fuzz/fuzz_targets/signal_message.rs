//! Fuzz target for signaling unit parsing
//!
//! Anything that parses as a signaling unit must serialize back to an
//! equivalent unit.

#![no_main]

use kindred_core::SignalMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = serde_json::from_slice::<SignalMessage>(data) else {
        return;
    };

    let encoded = serde_json::to_vec(&message).expect("signal message serializes");
    let decoded: SignalMessage = serde_json::from_slice(&encoded).expect("reparses");
    assert_eq!(decoded, message);
});
