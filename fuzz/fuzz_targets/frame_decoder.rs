//! Fuzz target for the length-prefixed frame decoder
//!
//! Arbitrary byte streams fed in arbitrary chunk sizes must not panic and
//! must never yield a frame above the configured limit.

#![no_main]

use arbitrary::Arbitrary;
use kindred_core::FrameDecoder;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    max_frame_len: u16,
    chunk_len: u8,
    bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let max = usize::from(input.max_frame_len);
    let mut decoder = FrameDecoder::new(max);
    let step = usize::from(input.chunk_len).max(1);

    for chunk in input.bytes.chunks(step) {
        match decoder.decode(chunk) {
            Ok(frames) => {
                for frame in frames {
                    assert!(frame.len() <= max);
                }
            }
            Err(_) => return,
        }
    }
});
