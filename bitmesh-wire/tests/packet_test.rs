use bitmesh_wire::constants::{TYPE_ANNOUNCE, TYPE_MESSAGE, VERSION_V2};
use bitmesh_wire::packet::{Packet, PacketSignature};
use bitmesh_wire::{PeerId, WireError};

fn sender() -> PeerId {
    PeerId::from(*b"\x01\x02\x03\x04\x05\x06\x07\x08")
}

#[test]
fn test_roundtrip_v1_minimal() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), b"hello mesh".to_vec(), 7, 1_700_000_000_000);
    let encoded = packet.encode(false).unwrap();
    let decoded = Packet::decode(&encoded).unwrap();
    assert_eq!(packet, decoded);
}

#[test]
fn test_roundtrip_v1_recipient_and_signature() {
    let mut packet = Packet::unicast(
        TYPE_MESSAGE,
        sender(),
        PeerId::from([0xAA; 8]),
        vec![0x42; 300],
        3,
        123_456_789,
    );
    packet.signature = Some(PacketSignature::from([0x5C; 64]));
    let encoded = packet.encode(false).unwrap();
    let decoded = Packet::decode(&encoded).unwrap();
    assert_eq!(packet, decoded);
}

#[test]
fn test_roundtrip_v2_route_and_compression() {
    let mut packet = Packet::broadcast(TYPE_ANNOUNCE, sender(), vec![9; 80], 5, 42);
    packet.version = VERSION_V2;
    packet.route = vec![PeerId::from([1; 8]), PeerId::from([2; 8]), PeerId::from([3; 8])];
    packet.is_compressed = true;
    packet.original_size = Some(4096);
    let encoded = packet.encode(false).unwrap();
    let decoded = Packet::decode(&encoded).unwrap();
    assert_eq!(packet, decoded);
}

#[test]
fn test_roundtrip_v2_large_payload() {
    let mut packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![7; 70_000], 2, 1);
    packet.version = VERSION_V2;
    let encoded = packet.encode(false).unwrap();
    let decoded = Packet::decode(&encoded).unwrap();
    assert_eq!(packet, decoded);
}

#[test]
fn test_v1_payload_too_long_for_length_field() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![0; 70_000], 2, 1);
    assert!(matches!(
        packet.encode(false),
        Err(WireError::MalformedFrame(_))
    ));
}

#[test]
fn test_v1_rejects_route() {
    let mut packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![1], 2, 1);
    packet.route = vec![PeerId::from([1; 8])];
    assert!(matches!(
        packet.encode(false),
        Err(WireError::MalformedFrame(_))
    ));
}

#[test]
fn test_unknown_version() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![1, 2, 3], 2, 1);
    let mut encoded = packet.encode(false).unwrap();
    encoded[0] = 9;
    assert!(matches!(
        Packet::decode(&encoded),
        Err(WireError::UnknownVersion(9))
    ));
}

#[test]
fn test_truncated_frame() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![1; 40], 2, 1);
    let encoded = packet.encode(false).unwrap();
    assert!(Packet::decode(&encoded[..encoded.len() - 5]).is_err());
}

#[test]
fn test_trailing_garbage_rejected() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![1; 40], 2, 1);
    let mut encoded = packet.encode(false).unwrap();
    encoded.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
    assert!(Packet::decode(&encoded).is_err());
}

#[test]
fn test_message_key_format() {
    let packet = Packet::broadcast(TYPE_MESSAGE, sender(), vec![], 2, 777);
    assert_eq!(packet.message_key(), "0102030405060708:777:4");
}

#[test]
fn test_signing_preimage_stable_under_relay_mutation() {
    let mut packet = Packet::unicast(
        TYPE_MESSAGE,
        sender(),
        PeerId::from([0xBB; 8]),
        b"signed content".to_vec(),
        7,
        1_000,
    );
    packet.signature = Some(PacketSignature::from([0x11; 64]));
    let preimage = packet.signing_bytes().unwrap();

    let mut relayed = packet.clone();
    relayed.ttl = 6;
    relayed.is_rsr = true;
    assert_eq!(preimage, relayed.signing_bytes().unwrap());

    let mut tampered = packet.clone();
    tampered.payload[0] ^= 1;
    assert_ne!(preimage, tampered.signing_bytes().unwrap());
}

#[test]
fn test_sender_id_normalization() {
    assert_eq!(
        PeerId::from_slice(&[1, 2, 3]),
        PeerId::from([1, 2, 3, 0, 0, 0, 0, 0])
    );
    assert_eq!(
        PeerId::from_slice(&[9; 12]),
        PeerId::from([9; 8])
    );
}
