//! Property-based tests for message encoding/decoding
//!
//! Handshake frames are pinned with inline snapshots so any change to the wire
//! layout shows up as a reviewable diff.

use shroud_proto::{
    Channel, Message, Opcode, PacketHeader, ProtocolError, SendBuffer,
    packet::{PACKET_HEADER_SIZE, encode_packet},
};
use proptest::prelude::*;

const MAX: usize = 1024;

fn arbitrary_message() -> impl Strategy<Value = Message> {
    let key = prop::collection::vec(any::<u8>(), 0..64);
    prop_oneof![
        key.clone().prop_map(|public_key| Message::ServerPublicKey { public_key }),
        key.prop_map(|public_key| Message::ClientPublicKey { public_key }),
        (prop::collection::vec(any::<u8>(), 0..512), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(ciphertext, nonce)| Message::Data { ciphertext, nonce }),
    ]
}

proptest! {
    #[test]
    fn message_survives_send_buffer(message in arbitrary_message()) {
        let mut buffer = SendBuffer::new(MAX);
        let frame = buffer.encode(&message).unwrap();

        prop_assert_eq!(frame.len(), message.encoded_len());
        prop_assert_eq!(Message::decode(&frame, MAX).unwrap(), message);
    }

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = Message::decode(&bytes, MAX);
    }

    #[test]
    fn truncated_frames_are_rejected(message in arbitrary_message(), cut in 1usize..8) {
        let wire = message.to_vec().unwrap();
        let keep = wire.len().saturating_sub(cut);

        // Cutting into the last field must fail; it never yields a shorter message
        let result = Message::decode(&wire[..keep], MAX);
        let is_truncated = matches!(result, Err(ProtocolError::Truncated { .. }));
        prop_assert!(is_truncated);
    }

    #[test]
    fn packet_header_preserves_channel(channel in any::<u8>(), frame in prop::collection::vec(any::<u8>(), 0..128)) {
        let mut out = Vec::new();
        encode_packet(Channel(channel), &frame, &mut out, MAX).unwrap();

        let header = PacketHeader::from_bytes(&out, MAX).unwrap();
        prop_assert_eq!(header.channel(), Channel(channel));
        prop_assert_eq!(header.length() as usize, frame.len());
        prop_assert_eq!(&out[PACKET_HEADER_SIZE..], &frame[..]);
    }
}

#[test]
fn server_public_key_wire_layout() {
    let message = Message::ServerPublicKey { public_key: vec![0xAB; 4] };
    let wire = message.to_vec().unwrap();

    assert_eq!(message.opcode(), Opcode::ServerPublicKey);
    insta::assert_snapshot!(hex::encode(&wire), @"0004000000abababab");
}

#[test]
fn client_public_key_wire_layout() {
    let message = Message::ClientPublicKey { public_key: vec![0x01, 0x02] };
    let wire = message.to_vec().unwrap();

    insta::assert_snapshot!(hex::encode(&wire), @"01020000000102");
}

#[test]
fn data_wire_layout() {
    let message = Message::Data { ciphertext: vec![0xCC; 3], nonce: vec![0x0F; 2] };
    let wire = message.to_vec().unwrap();

    insta::assert_snapshot!(hex::encode(&wire), @"0203000000cccccc020000000f0f");
}
