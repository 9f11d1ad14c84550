//! Fuzz target for Message::decode
//!
//! Feeds arbitrary bytes to the message decoder to find:
//! - Parser panics
//! - Length prefixes that slip past the field cap
//! - Allocations driven by hostile lengths
//!
//! The decoder should NEVER panic. Anything it accepts must re-encode to a
//! prefix of the input.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_proto::Message;

const MAX_FIELD_LEN: usize = 16 * 1024;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = Message::decode(data, MAX_FIELD_LEN) else {
        return;
    };

    let encoded = message.to_vec().expect("decoded message must re-encode");
    assert!(encoded.len() <= data.len());
    assert_eq!(&data[..encoded.len()], &encoded[..], "trailing bytes are the only slack");
});
