
use futures_util::{SinkExt, StreamExt};
use room_relay::protocol::RoomKey;
use test_helpers::{
    assert_silent, connect_client, next_frame, next_json, next_text, start_test_relay,
    wait_until,
};
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const QUIET: Duration = Duration::from_millis(300);

fn room(raw: &str) -> RoomKey {
    RoomKey::new(raw).unwrap()
}

#[tokio::test]
async fn full_signaling_handshake() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/room1").await;
    assert_eq!(
        next_text(&mut a_rx).await,
        r#"{"type":"connected","roomId":"room1"}"#
    );

    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/room1?initiator=true").await;
    assert_eq!(
        next_text(&mut b_rx).await,
        r#"{"type":"connected","roomId":"room1"}"#
    );
    assert_eq!(next_text(&mut a_rx).await, r#"{"type":"peer-ready"}"#);

    let offer = r#"{"type":"offer","sdp":"v=0\r\no=- 46117 2 IN IP4 127.0.0.1"}"#;
    a_tx.send(Message::Text(offer.into())).await.unwrap();

    assert_eq!(next_text(&mut b_rx).await, offer);
    assert_silent(&mut a_rx, QUIET).await;
    assert_silent(&mut b_rx, QUIET).await;
}

#[tokio::test]
async fn relay_is_bidirectional_and_verbatim() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/pair").await;
    next_text(&mut a_rx).await;
    let (mut b_tx, mut b_rx) = connect_client(relay.addr, "/pair?initiator=true").await;
    next_text(&mut b_rx).await;
    next_text(&mut a_rx).await; // peer-ready

    // Whitespace and key order must survive untouched.
    let answer = "{ \"sdp\" : \"x\",  \"type\":\"answer\" }";
    b_tx.send(Message::Text(answer.into())).await.unwrap();
    assert_eq!(next_text(&mut a_rx).await, answer);

    let candidate = r#"{"type":"ice-candidate","candidate":{"sdpMid":"0"}}"#;
    a_tx.send(Message::Text(candidate.into())).await.unwrap();
    assert_eq!(next_text(&mut b_rx).await, candidate);
}

#[tokio::test]
async fn messages_from_one_sender_arrive_in_order() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/ordered").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/ordered?initiator=true").await;
    next_text(&mut b_rx).await;

    for seq in 0..10 {
        let frame = format!(r#"{{"type":"ice-candidate","seq":{seq}}}"#);
        a_tx.send(Message::Text(frame.into())).await.unwrap();
    }
    for seq in 0..10 {
        let frame = next_json(&mut b_rx).await;
        assert_eq!(frame["seq"], seq);
    }
}

#[tokio::test]
async fn empty_room_id_is_refused_with_policy_violation() {
    let relay = start_test_relay().await;

    let (_tx, mut rx) = connect_client(relay.addr, "/?initiator=true").await;
    match next_frame(&mut rx).await {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1008);
            assert_eq!(frame.reason.as_str(), "Room ID required");
        }
        other => panic!("expected policy close, got {other:?}"),
    }

    assert_eq!(relay.server.registry().room_count(), 0);
    assert_eq!(relay.server.metrics_snapshot().admission_refusals, 1);
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_closing() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/lossy").await;
    next_text(&mut a_rx).await;
    let (mut b_tx, mut b_rx) = connect_client(relay.addr, "/lossy?initiator=true").await;
    next_text(&mut b_rx).await;
    next_text(&mut a_rx).await; // peer-ready

    a_tx.send(Message::Text("not json at all".into())).await.unwrap();
    a_tx.send(Message::Text("[1,2,3]".into())).await.unwrap();
    a_tx.send(Message::Text(r#"{"type":"offer"}"#.into())).await.unwrap();

    // Only the well-formed frame comes through, and it comes through first.
    assert_eq!(next_text(&mut b_rx).await, r#"{"type":"offer"}"#);
    assert_silent(&mut b_rx, QUIET).await;

    // The sender is still connected in both directions.
    b_tx.send(Message::Text(r#"{"type":"answer"}"#.into())).await.unwrap();
    assert_eq!(next_text(&mut a_rx).await, r#"{"type":"answer"}"#);

    let snapshot = relay.server.metrics_snapshot();
    assert_eq!(snapshot.parse_errors, 2);
    assert_eq!(relay.server.registry().member_count(&room("lossy")), 2);
}

#[tokio::test]
async fn utf8_binary_frames_are_relayed_as_text() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/binary").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/binary?initiator=true").await;
    next_text(&mut b_rx).await;

    a_tx.send(Message::Binary(br#"{"type":"offer"}"#.to_vec().into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut b_rx).await, r#"{"type":"offer"}"#);
}

#[tokio::test]
async fn non_utf8_binary_frames_are_dropped() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/raw").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/raw?initiator=true").await;
    next_text(&mut b_rx).await;

    a_tx.send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
        .await
        .unwrap();
    a_tx.send(Message::Text(r#"{"type":"offer"}"#.into())).await.unwrap();

    assert_eq!(next_text(&mut b_rx).await, r#"{"type":"offer"}"#);
    assert_eq!(relay.server.metrics_snapshot().parse_errors, 1);
}

#[tokio::test]
async fn rooms_are_isolated() {
    let relay = start_test_relay().await;

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/left").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/left?initiator=true").await;
    next_text(&mut b_rx).await;
    let (_c_tx, mut c_rx) = connect_client(relay.addr, "/right").await;
    assert_eq!(
        next_text(&mut c_rx).await,
        r#"{"type":"connected","roomId":"right"}"#
    );

    a_tx.send(Message::Text(r#"{"type":"offer"}"#.into())).await.unwrap();
    assert_eq!(next_text(&mut b_rx).await, r#"{"type":"offer"}"#);
    assert_silent(&mut c_rx, QUIET).await;
}

#[tokio::test]
async fn initiator_joining_first_never_announces() {
    let relay = start_test_relay().await;

    let (_a_tx, mut a_rx) = connect_client(relay.addr, "/early?initiator=true").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/early").await;
    next_text(&mut b_rx).await;

    assert_silent(&mut a_rx, QUIET).await;
    assert_silent(&mut b_rx, QUIET).await;
    assert_eq!(relay.server.metrics_snapshot().peer_ready_sent, 0);
}

#[tokio::test]
async fn third_member_is_admitted_without_peer_ready() {
    let relay = start_test_relay().await;

    let (_a_tx, mut a_rx) = connect_client(relay.addr, "/crowded").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/crowded?initiator=true").await;
    next_text(&mut b_rx).await;
    assert_eq!(next_text(&mut a_rx).await, r#"{"type":"peer-ready"}"#);

    let (mut c_tx, mut c_rx) = connect_client(relay.addr, "/crowded?initiator=true").await;
    assert_eq!(
        next_text(&mut c_rx).await,
        r#"{"type":"connected","roomId":"crowded"}"#
    );
    assert_silent(&mut a_rx, QUIET).await;
    assert_silent(&mut b_rx, QUIET).await;
    assert_eq!(relay.server.registry().member_count(&room("crowded")), 3);

    // The extra member still relays to everyone else.
    c_tx.send(Message::Text(r#"{"type":"offer"}"#.into())).await.unwrap();
    assert_eq!(next_text(&mut a_rx).await, r#"{"type":"offer"}"#);
    assert_eq!(next_text(&mut b_rx).await, r#"{"type":"offer"}"#);
}

#[tokio::test]
async fn disconnect_tears_down_membership_and_room() {
    let relay = start_test_relay().await;
    let key = room("ephemeral");

    let (mut a_tx, mut a_rx) = connect_client(relay.addr, "/ephemeral").await;
    next_text(&mut a_rx).await;
    let (b_tx, mut b_rx) = connect_client(relay.addr, "/ephemeral?initiator=true").await;
    next_text(&mut b_rx).await;
    next_text(&mut a_rx).await; // peer-ready
    assert_eq!(relay.server.registry().member_count(&key), 2);

    // Abrupt drop without a close handshake.
    drop(b_tx);
    drop(b_rx);
    let registry_server = relay.server.clone();
    let key_for_wait = key.clone();
    assert!(
        wait_until(move || registry_server.registry().member_count(&key_for_wait) == 1).await
    );

    // Messages to a departed peer vanish quietly; the sender stays connected.
    a_tx.send(Message::Text(r#"{"type":"offer"}"#.into())).await.unwrap();
    assert_silent(&mut a_rx, QUIET).await;

    a_tx.send(Message::Close(None)).await.unwrap();
    let server = relay.server.clone();
    let key_for_wait = key.clone();
    assert!(wait_until(move || !server.registry().contains_room(&key_for_wait)).await);
    assert_eq!(relay.server.registry().room_count(), 0);

    let server = relay.server.clone();
    assert!(wait_until(move || server.metrics_snapshot().connections_active == 0).await);
    let snapshot = relay.server.metrics_snapshot();
    assert_eq!(snapshot.rooms_created, 1);
    assert_eq!(snapshot.rooms_deleted, 1);
    assert_eq!(snapshot.connections_total, 2);
}

#[tokio::test]
async fn room_can_be_reused_after_it_empties() {
    let relay = start_test_relay().await;

    {
        let (mut tx, mut rx) = connect_client(relay.addr, "/again").await;
        next_text(&mut rx).await;
        tx.send(Message::Close(None)).await.unwrap();
        let server = relay.server.clone();
        assert!(wait_until(move || server.registry().room_count() == 0).await);
    }

    let (_a_tx, mut a_rx) = connect_client(relay.addr, "/again").await;
    next_text(&mut a_rx).await;
    let (_b_tx, mut b_rx) = connect_client(relay.addr, "/again?initiator=true").await;
    next_text(&mut b_rx).await;
    assert_eq!(next_text(&mut a_rx).await, r#"{"type":"peer-ready"}"#);
}

#[tokio::test]
async fn shutdown_closes_live_connections_with_going_away() {
    let relay = start_test_relay().await;

    let (_a_tx, mut a_rx) = connect_client(relay.addr, "/closing").await;
    next_text(&mut a_rx).await;

    relay.server.begin_shutdown();

    let frame = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            match a_rx.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("close frame within timeout")
    .expect("close frame carries a code");

    assert_eq!(u16::from(frame.code), 1001);
    let server = relay.server.clone();
    assert!(wait_until(move || server.registry().room_count() == 0).await);
}
