//! Fuzz target for PacketHeader::from_bytes
//!
//! Any header the parser accepts must respect the length cap and survive a
//! round trip through `to_bytes`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_proto::{PacketHeader, packet::PACKET_HEADER_SIZE};

fuzz_target!(|input: (u16, &[u8])| {
    let (max_len, bytes) = input;
    let max_len = usize::from(max_len);

    let Ok(header) = PacketHeader::from_bytes(bytes, max_len) else {
        return;
    };

    assert!(bytes.len() >= PACKET_HEADER_SIZE);
    assert!(header.length() as usize <= max_len);
    assert_eq!(&header.to_bytes()[..], &bytes[..PACKET_HEADER_SIZE]);
});
