use bitmesh_core::adapter::{AdapterEvent, AdapterState, DeviceId, LinkEvent};
use bitmesh_core::testing::{identity_from_byte, AdapterCall, MockAdapter, VirtualAirspace};
use bitmesh_core::{MeshConfig, MeshError, MeshService, MeshStatus, Transport};
use bitmesh_wire::constants::TYPE_MESSAGE;
use bitmesh_wire::packet::Packet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn quick_config(nickname: &str) -> MeshConfig {
    MeshConfig {
        nickname: nickname.to_owned(),
        connect_settle: Duration::from_millis(10),
        connect_timeout: Duration::from_millis(300),
        start_timeout: Duration::from_millis(100),
        ..MeshConfig::default()
    }
}

#[tokio::test]
async fn test_start_times_out_without_definite_adapter_state() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::Unknown));
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let result = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter,
        events_rx,
    )
    .await;
    assert!(matches!(result, Err(MeshError::Timeout(_))));
}

#[tokio::test]
async fn test_start_rejects_off_adapter() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::Off));
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let result = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter,
        events_rx,
    )
    .await;
    assert!(matches!(result, Err(MeshError::AdapterOff)));
}

#[tokio::test]
async fn test_start_waits_for_state_event() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::Unknown));
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let waiter = adapter.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        waiter.set_state(AdapterState::On);
        let _ = events_tx.send(AdapterEvent::StateChanged(AdapterState::On));
    });

    let result = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await;
    assert!(result.is_ok());
    assert!(adapter.take_calls().contains(&AdapterCall::StartScan));
}

#[tokio::test]
async fn test_connect_sequence_and_link_lifecycle() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();
    assert_eq!(handle.status().await.unwrap(), MeshStatus::Scanning);

    let device = DeviceId::new("aa:bb");
    events_tx
        .send(AdapterEvent::ScanResult {
            device: device.clone(),
            rssi: -50,
        })
        .unwrap();
    sleep(Duration::from_millis(100)).await;

    // Scan paused, then the connect was issued after the settle delay.
    let calls = adapter.take_calls();
    assert!(calls.contains(&AdapterCall::StopScan));
    assert!(calls.contains(&AdapterCall::Connect(device.clone())));
    assert_eq!(handle.status().await.unwrap(), MeshStatus::Connecting);

    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Ready { mtu: 182 },
        })
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.status().await.unwrap(), MeshStatus::Connected);
    let calls = adapter.take_calls();
    // The scan restarts after the attempt, and the fresh link immediately
    // receives our hello followed by a signed announce.
    assert!(calls.contains(&AdapterCall::StartScan));
    let writes: Vec<&Vec<u8>> = calls
        .iter()
        .filter_map(|call| match call {
            AdapterCall::Write(to, data) if *to == device => Some(data),
            _ => None,
        })
        .collect();
    assert!(writes.len() >= 2);
    assert_eq!(&writes[0][..2], &[0xBC, 0x01]);

    // Unicast works on the live link, fails on unknown devices.
    handle
        .unicast_to(device.clone(), TYPE_MESSAGE, b"direct".to_vec(), 3)
        .await
        .unwrap();
    let missing = handle
        .unicast_to(DeviceId::new("nope"), TYPE_MESSAGE, b"x".to_vec(), 3)
        .await;
    assert!(matches!(missing, Err(MeshError::LinkUnavailable(_))));

    let peers = handle.peers().await.unwrap();
    assert!(peers.iter().any(|p| p.device == device && p.is_connected));

    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Disconnected,
        })
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.status().await.unwrap(), MeshStatus::Scanning);
}

#[tokio::test]
async fn test_failed_attempt_backs_off_and_rescans() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();

    let device = DeviceId::new("cc:dd");
    events_tx
        .send(AdapterEvent::ScanResult {
            device: device.clone(),
            rssi: -40,
        })
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(adapter.take_calls().contains(&AdapterCall::Connect(device.clone())));

    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Failed,
        })
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.status().await.unwrap(), MeshStatus::Scanning);
    assert!(adapter.take_calls().contains(&AdapterCall::StartScan));

    // The same device re-advertising inside the backoff window is ignored.
    events_tx
        .send(AdapterEvent::ScanResult {
            device: device.clone(),
            rssi: -40,
        })
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert!(!adapter
        .take_calls()
        .contains(&AdapterCall::Connect(device.clone())));
}

#[tokio::test]
async fn test_adapter_off_demotes_to_error_and_recovers() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();

    events_tx
        .send(AdapterEvent::StateChanged(AdapterState::Off))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.status().await.unwrap(), MeshStatus::Error);

    adapter.set_state(AdapterState::On);
    events_tx
        .send(AdapterEvent::StateChanged(AdapterState::On))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.status().await.unwrap(), MeshStatus::Scanning);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (_events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();

    handle.stop().await.unwrap();
    handle.stop().await.unwrap();

    assert_eq!(handle.transport().status().state, MeshStatus::Stopped);
    assert!(adapter.take_calls().contains(&AdapterCall::DisconnectAll));
    assert!(matches!(
        handle.broadcast(TYPE_MESSAGE, vec![], 3).await,
        Err(MeshError::Disposed)
    ));
}

/// Three nodes in a triangle: A broadcasts, B delivers once and relays with
/// the ttl decremented, C delivers once, and the copy C relays back to A is
/// ignored as A's own traffic.
#[tokio::test]
async fn test_three_node_relay() {
    let airspace = VirtualAirspace::new();
    airspace.link("A", "B");
    airspace.link("B", "C");
    airspace.link("C", "A");

    let (adapter_a, a_tx, a_rx) = airspace.join("A");
    let (adapter_b, b_tx, b_rx) = airspace.join("B");
    let (adapter_c, c_tx, c_rx) = airspace.join("C");

    let (handle_a, mut inbound_a) = MeshService::start(
        quick_config("alice"),
        identity_from_byte(1),
        adapter_a,
        a_rx,
    )
    .await
    .unwrap();
    let (_handle_b, mut inbound_b) = MeshService::start(
        quick_config("bob"),
        identity_from_byte(2),
        adapter_b,
        b_rx,
    )
    .await
    .unwrap();
    let (handle_c, mut inbound_c) = MeshService::start(
        quick_config("carol"),
        identity_from_byte(3),
        adapter_c,
        c_rx,
    )
    .await
    .unwrap();

    // Bring up the links: A-B, B-A, B-C, C-B, C-A.
    let ready = |device: &str| AdapterEvent::Connection {
        device: DeviceId::new(device),
        event: LinkEvent::Ready { mtu: 182 },
    };
    a_tx.send(ready("B")).unwrap();
    b_tx.send(ready("A")).unwrap();
    b_tx.send(ready("C")).unwrap();
    c_tx.send(ready("B")).unwrap();
    c_tx.send(ready("A")).unwrap();
    sleep(Duration::from_millis(150)).await;

    handle_a
        .broadcast(TYPE_MESSAGE, b"hello mesh".to_vec(), 3)
        .await
        .unwrap();

    async fn expect_message(
        inbound: &mut mpsc::UnboundedReceiver<bitmesh_core::InboundPacket>,
    ) -> Packet {
        loop {
            let received = timeout(Duration::from_secs(2), inbound.recv())
                .await
                .expect("timed out waiting for packet")
                .expect("stream closed");
            if received.packet.packet_type == TYPE_MESSAGE {
                return received.packet;
            }
        }
    }

    let at_b: Packet = expect_message(&mut inbound_b).await;
    assert_eq!(at_b.payload, b"hello mesh");
    assert_eq!(at_b.ttl, 3);
    assert_eq!(at_b.sender_id, identity_from_byte(1).peer_id());

    let at_c: Packet = expect_message(&mut inbound_c).await;
    assert_eq!(at_c.payload, b"hello mesh");
    // One relay hop: B forwarded with the ttl decremented.
    assert_eq!(at_c.ttl, 2);

    // A never sees its own message come back around the triangle.
    sleep(Duration::from_millis(200)).await;
    let mut echoed = false;
    while let Ok(received) = inbound_a.try_recv() {
        if received.packet.packet_type == TYPE_MESSAGE {
            echoed = true;
        }
    }
    assert!(!echoed, "A received its own broadcast back");

    // A learned about both peers from their announces.
    let peers = handle_a.peers().await.unwrap();
    assert!(peers
        .iter()
        .any(|p| p.nickname.as_deref() == Some("bob")));

    // C saw exactly one copy of the message even though B and A both touch
    // it; the duplicate was suppressed.
    let metrics = handle_c.metrics().await.unwrap();
    assert!(metrics.packets_relayed >= 1);
}

#[tokio::test]
async fn test_transport_seam_over_radio() {
    use bitmesh_core::{LinkId, Transport};

    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();
    let transport = handle.transport();

    let device = DeviceId::new("ee:ff");
    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Ready { mtu: 182 },
        })
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(transport.status().active_links, 1);
    assert_eq!(transport.status().state, MeshStatus::Connected);

    let frame = vec![0x42; 64];
    adapter.take_calls();
    transport.broadcast(&frame).unwrap();
    assert!(transport.unicast(&LinkId::Radio(device.clone()), &frame));
    assert!(!transport.unicast(&LinkId::Radio(DeviceId::new("nope")), &frame));
    sleep(Duration::from_millis(50)).await;

    let writes: Vec<_> = adapter
        .writes()
        .into_iter()
        .filter(|(to, data)| *to == device && data == &frame)
        .collect();
    assert_eq!(writes.len(), 2, "broadcast plus unicast");
}

#[tokio::test]
async fn test_write_failures_are_silent_but_counted() {
    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();

    events_tx
        .send(AdapterEvent::Connection {
            device: DeviceId::new("broken"),
            event: LinkEvent::Ready { mtu: 182 },
        })
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    adapter.set_fail_writes(true);
    handle
        .broadcast(TYPE_MESSAGE, b"into the void".to_vec(), 3)
        .await
        .unwrap();

    let metrics = handle.metrics().await.unwrap();
    assert!(metrics.link_write_failures >= 1);
}

#[tokio::test]
async fn test_transport_inbound_and_peer_streams() {
    use bitmesh_core::{LinkId, PeerEvent, Transport};

    let adapter = Arc::new(MockAdapter::new(AdapterState::On));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, _inbound) = MeshService::start(
        quick_config("t"),
        identity_from_byte(1),
        adapter.clone(),
        events_rx,
    )
    .await
    .unwrap();
    let transport = handle.transport();
    let mut frames = transport.inbound();
    let mut peer_events = transport.peer_events();
    sleep(Duration::from_millis(50)).await;

    let device = DeviceId::new("aa:bb");
    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Ready { mtu: 182 },
        })
        .unwrap();

    match timeout(Duration::from_secs(1), peer_events.recv())
        .await
        .unwrap()
        .unwrap()
    {
        PeerEvent::LinkUp(link) => assert_eq!(link, LinkId::Radio(device.clone())),
        other => panic!("expected LinkUp, got {other:?}"),
    }

    // A frame from a peer shows up on the transport inbound stream exactly
    // as it arrived.
    let frame = Packet::broadcast(
        TYPE_MESSAGE,
        identity_from_byte(2).peer_id(),
        b"raw frame".to_vec(),
        2,
        5,
    )
    .encode(true)
    .unwrap();
    events_tx
        .send(AdapterEvent::Data {
            device: device.clone(),
            data: frame.clone(),
        })
        .unwrap();
    let (from, received) = timeout(Duration::from_secs(1), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, LinkId::Radio(device.clone()));
    assert_eq!(received, frame);

    events_tx
        .send(AdapterEvent::Connection {
            device: device.clone(),
            event: LinkEvent::Disconnected,
        })
        .unwrap();
    loop {
        match timeout(Duration::from_secs(1), peer_events.recv())
            .await
            .unwrap()
            .unwrap()
        {
            PeerEvent::LinkDown(link) => {
                assert_eq!(link, LinkId::Radio(device));
                break;
            }
            _ => {}
        }
    }
}
