use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitmesh_core::{LinkId, MeshStatus, Transport};
use bitmesh_relay::{
    RelayConfig, RelayEvent, RelayKeys, RelayPool, RelayTransport, FRAME_EVENT_KIND,
};

fn keys() -> RelayKeys {
    let mut secret = [0u8; 32];
    secret[31] = 21;
    RelayKeys::from_secret(secret).unwrap()
}

#[test]
fn test_decode_frame_roundtrip() {
    let frame = vec![0x01, 0x04, 0x07, 0xFF, 0x00, 0x42];
    let event = RelayEvent::sign_new(
        &keys(),
        1_700_000_000,
        FRAME_EVENT_KIND,
        vec![],
        BASE64.encode(&frame),
    )
    .unwrap();
    assert!(event.verify().is_ok());
    assert_eq!(RelayTransport::decode_frame(&event), Some(frame));
}

#[test]
fn test_decode_frame_rejects_other_kinds() {
    let event = RelayEvent::sign_new(
        &keys(),
        1_700_000_000,
        1,
        vec![],
        BASE64.encode(b"not a frame carrier"),
    )
    .unwrap();
    assert_eq!(RelayTransport::decode_frame(&event), None);

    let garbage = RelayEvent::sign_new(
        &keys(),
        1_700_000_000,
        FRAME_EVENT_KIND,
        vec![],
        "%%% not base64 %%%".into(),
    )
    .unwrap();
    assert_eq!(RelayTransport::decode_frame(&garbage), None);
}

#[tokio::test]
async fn test_transport_over_empty_pool() {
    let (pool, _events) = RelayPool::start(RelayConfig::default());
    let transport = RelayTransport::new(pool, keys(), vec!["u4pru".into()]);

    // No relays configured: broadcast is accepted (fan-out to zero),
    // unicast to an unknown relay reports false.
    assert!(transport.broadcast(b"frame").is_ok());
    assert!(!transport.unicast(&LinkId::Relay("wss://nowhere".into()), b"frame"));
    assert!(!transport.unicast(&LinkId::Radio("not-a-relay".into()), b"frame"));

    let status = transport.status();
    assert_eq!(status.state, MeshStatus::Idle);
    assert_eq!(status.active_links, 0);

    transport.pool().shutdown().await;
}

#[tokio::test]
async fn test_transport_streams_close_on_shutdown() {
    let (pool, _events) = RelayPool::start(RelayConfig::default());
    let transport = RelayTransport::new(pool, keys(), vec![]);
    let mut inbound = transport.inbound();
    let mut peer_events = transport.peer_events();

    transport.pool().shutdown().await;

    // The pool loop is gone, so both subscription streams read as closed.
    assert!(inbound.recv().await.is_none());
    assert!(peer_events.recv().await.is_none());
}
