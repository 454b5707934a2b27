use crate::*;

/// A client that vanishes without deregistering is removed from the registry.
#[tokio::test]
async fn test_disconnect_cleans_up_address() {
    let relay = Relay::start().await.unwrap();

    let mut s1 = Client::connect(&relay).await.unwrap();
    let mut s2 = Client::connect(&relay).await.unwrap();
    relay.wait_for_sessions(2).await.unwrap();

    s1.register("A").await.unwrap();
    s1.list_request("before").await.unwrap();
    assert_eq!(s2.recv_peers().await.unwrap().1, vec!["A"]);

    s1.close().await.unwrap();
    relay.wait_for_sessions(1).await.unwrap();

    s2.list_request("after").await.unwrap();
    let (tag, peers) = s2.recv_peers().await.unwrap();
    assert_eq!(tag, "after");
    assert!(!peers.contains(&"A".to_string()), "stale peer listed: {peers:?}");

    relay.stop().await;
}

/// Dropping the TCP stream without a close frame still triggers cleanup.
#[tokio::test]
async fn test_abrupt_drop_cleans_up_address() {
    let relay = Relay::start().await.unwrap();

    let mut s1 = Client::connect(&relay).await.unwrap();
    s1.register("B").await.unwrap();

    let start = Instant::now();
    while relay.peer_addresses().await.unwrap().is_empty() {
        assert!(start.elapsed() < RECV_TIMEOUT, "registration never applied");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    drop(s1);
    relay.wait_for_sessions(0).await.unwrap();
    assert!(relay.peer_addresses().await.unwrap().is_empty());

    relay.stop().await;
}

/// An empty address is rejected to the sender only; the connection survives.
#[tokio::test]
async fn test_malformed_register_is_contained() {
    let relay = Relay::start().await.unwrap();

    let mut bad = Client::connect(&relay).await.unwrap();
    let mut bystander = Client::connect(&relay).await.unwrap();
    relay.wait_for_sessions(2).await.unwrap();

    bad.register("").await.unwrap();
    match bad.recv().await.unwrap() {
        ServerMessage::Error { event, reason } => {
            assert_eq!(event.as_deref(), Some("register"));
            assert!(reason.contains("empty"), "unexpected reason: {reason}");
        }
        other => panic!("expected error, got {other:?}"),
    }

    assert!(bystander.is_silent_for(Duration::from_millis(200)).await);
    assert!(relay.peer_addresses().await.unwrap().is_empty());

    // still connected and usable
    bad.list_request("ok").await.unwrap();
    assert_eq!(bad.recv_peers().await.unwrap(), ("ok".to_string(), vec![]));
    assert_eq!(bystander.recv_peers().await.unwrap().0, "ok");

    relay.stop().await;
}

/// Missing fields, unknown events, garbage and non-UTF-8 binary frames all
/// produce an error reply without dropping the session.
#[tokio::test]
async fn test_garbage_frames_get_error_replies() {
    let relay = Relay::start().await.unwrap();
    let mut c = Client::connect(&relay).await.unwrap();

    c.send_raw(r#"{"event":"deregister"}"#).await.unwrap();
    c.send_raw(r#"{"event":"join","address":"A"}"#).await.unwrap();
    c.send_raw("definitely not json").await.unwrap();
    c.send_binary(vec![0xff, 0xfe, 0xfd]).await.unwrap();

    for _ in 0..4 {
        assert!(
            matches!(c.recv().await.unwrap(), ServerMessage::Error { .. }),
            "expected an error reply"
        );
    }

    c.register("C").await.unwrap();
    c.list_request("t").await.unwrap();
    assert_eq!(c.recv_peers().await.unwrap().1, vec!["C"]);

    relay.stop().await;
}

/// A client that never reads must not stall delivery to others.
#[tokio::test]
async fn test_stalled_reader_does_not_block_others() {
    let relay = Relay::start_with(GatewayConfig {
        outbound_queue_depth: 2,
        ..GatewayConfig::default()
    })
    .await
    .unwrap();

    let _stalled = Client::connect(&relay).await.unwrap();
    let mut active = Client::connect(&relay).await.unwrap();
    relay.wait_for_sessions(2).await.unwrap();

    // Large lists overflow the stalled client's socket and queue.
    for i in 0..200 {
        active.register(&format!("10.1.{}.{}:6000", i / 250, i % 250)).await.unwrap();
    }
    for i in 0..200 {
        active.list_request(&format!("round-{i}")).await.unwrap();
        let (tag, peers) = active.recv_peers().await.unwrap();
        assert_eq!(tag, format!("round-{i}"));
        assert_eq!(peers.len(), 200);
    }

    let status = relay.gateway.status().await.unwrap();
    assert_eq!(status.sessions.len(), 2);

    relay.stop().await;
}
