//! End-to-end scenarios for the protocol FSM, driving a real
//! [`ProtocolHandle`] actor over a [`RecordingTransport`] test double.
//! Mirrors spec scenarios 1-5 (echo-only, echo-then-reply, echo timeout
//! with retry, priority ordering, and the `HGI_DEVICE_ID` sentinel
//! rewrite).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ramses_protocol::header::{Code, PartyId, Verb};
use ramses_protocol::transport::test_support::RecordingTransport;
use ramses_protocol::{Command, MessageIndex, Packet, Priority, ProtocolConfig, ProtocolHandle, ProtocolSendFailed, QosParams};
use serde_json::json;

fn id(raw: &str) -> PartyId {
    PartyId::parse(raw).unwrap()
}

fn spawn_handle(config: ProtocolConfig) -> (ProtocolHandle, RecordingTransport) {
    let handle = ProtocolHandle::spawn(config, id("18:111111"), Arc::new(MessageIndex::new()), None);
    let transport = RecordingTransport::new();
    (handle, transport)
}

async fn bring_up(handle: &ProtocolHandle, transport: &RecordingTransport) {
    handle
        .connection_made(Arc::new(transport.clone()))
        .await;
    // Give the actor a moment to process the Connect event before the
    // test starts enqueueing sends.
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn echo_only_command_succeeds() {
    let (handle, transport) = spawn_handle(ProtocolConfig::default());
    bring_up(&handle, &transport).await;

    let cmd = Command::new(Code(0x1298), Verb::I, id("18:111111"), id("32:166025"), None, "007FFF", Priority::Default)
        .with_rx_header(None);
    let tx_header = cmd.tx_header.clone();

    let sender = handle.clone();
    let cmd_for_send = cmd.clone();
    let send_task = tokio::spawn(async move {
        sender
            .send(cmd_for_send, Priority::Default, QosParams::new(Duration::from_secs(2), 1, true))
            .await
    });

    // Wait until the command actually reaches the transport before
    // echoing it back. The echo carries the same src/dst as the command
    // itself (it's the gateway reflecting its own transmission).
    wait_until(|| !transport.sent().is_empty()).await;
    let echoed = Packet::new(Code(0x1298), Verb::I, id("18:111111"), id("32:166025"), None, Utc::now(), "007FFF");
    assert_eq!(echoed.hdr, tx_header);
    handle.pkt_received(echoed.clone(), json!({ "co2_level": null })).await;

    let result = send_task.await.unwrap();
    assert_eq!(result.unwrap(), echoed);
}

#[tokio::test]
async fn echo_then_reply_resolves_with_the_reply() {
    let (handle, transport) = spawn_handle(ProtocolConfig::default());
    bring_up(&handle, &transport).await;

    let cmd = Command::new(Code(0x2349), Verb::RQ, id("18:111111"), id("01:078710"), Some("02".into()), "00", Priority::Default);

    let sender = handle.clone();
    let cmd_for_send = cmd.clone();
    let send_task = tokio::spawn(async move {
        sender
            .send(cmd_for_send, Priority::Default, QosParams::new(Duration::from_secs(2), 1, true))
            .await
    });

    wait_until(|| !transport.sent().is_empty()).await;
    let echo = Packet::new(Code(0x2349), Verb::RQ, id("18:111111"), id("01:078710"), Some("02".into()), Utc::now(), "00");
    handle.pkt_received(echo, json!({})).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let reply = Packet::new(Code(0x2349), Verb::RP, id("01:078710"), id("18:111111"), Some("02".into()), Utc::now(), "00C8");
    handle.pkt_received(reply.clone(), json!({ "temperature": 20.0 })).await;

    let result = send_task.await.unwrap();
    assert_eq!(result.unwrap(), reply);
}

#[tokio::test]
async fn echo_timeout_retries_then_exhausts() {
    let mut config = ProtocolConfig::default();
    config.echo_timeout = Duration::from_millis(20);
    let (handle, transport) = spawn_handle(config);
    bring_up(&handle, &transport).await;

    let cmd = Command::new(Code(0x2309), Verb::I, id("18:111111"), id("01:078710"), None, "00", Priority::Default)
        .with_rx_header(None);

    let qos = QosParams::new(Duration::from_secs(2), 2, true);
    let result = handle.send(cmd, Priority::Default, qos).await;

    assert!(matches!(result, Err(ProtocolSendFailed::MaxRetriesExceeded)));
    // One initial send plus two retries.
    assert_eq!(transport.sent().len(), 3);
}

#[tokio::test]
async fn priority_ordering_dispatches_high_before_default() {
    let mut config = ProtocolConfig::default();
    config.echo_timeout = Duration::from_secs(5);
    let (handle, transport) = spawn_handle(config);
    bring_up(&handle, &transport).await;

    // Pin the FSM busy with a blocker command (left unacknowledged) so
    // cmd_a/cmd_b/cmd_c all land in the queue before any of them can be
    // dispatched, making the priority ordering of the pop observable.
    let blocker = Command::new(Code(0x0000), Verb::I, id("18:111111"), id("01:000000"), None, "00", Priority::Default)
        .with_rx_header(None);
    let blocker_qos = QosParams::new(Duration::from_secs(5), 0, true);
    let blocker_handle = handle.clone();
    let blocker_cmd = blocker.clone();
    let blocker_task =
        tokio::spawn(async move { blocker_handle.send(blocker_cmd, Priority::Default, blocker_qos).await });
    wait_until(|| !transport.sent().is_empty()).await;

    let cmd_a = Command::new(Code(0x0001), Verb::I, id("18:111111"), id("01:000001"), None, "00", Priority::Default)
        .with_rx_header(None);
    let cmd_b = Command::new(Code(0x0002), Verb::I, id("18:111111"), id("01:000002"), None, "00", Priority::High)
        .with_rx_header(None);
    let cmd_c = Command::new(Code(0x0003), Verb::I, id("18:111111"), id("01:000003"), None, "00", Priority::Default)
        .with_rx_header(None);

    let qos = QosParams::new(Duration::from_secs(5), 0, true);
    let ha = handle.clone();
    let hb = handle.clone();
    let hc = handle.clone();
    let ta = tokio::spawn(async move { ha.send(cmd_a, Priority::Default, qos).await });
    let tb = tokio::spawn(async move { hb.send(cmd_b, Priority::High, qos).await });
    let tc = tokio::spawn(async move { hc.send(cmd_c, Priority::Default, qos).await });

    // Give all three sends time to reach the actor and land in the
    // queue behind the still in-flight blocker.
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Release the blocker. `dispatch_next` now has all three queued and
    // should pop cmd_b (High) ahead of cmd_a/cmd_c (Default, FIFO).
    let blocker_echo = Packet::new(Code(0x0000), Verb::I, id("18:111111"), id("01:000000"), None, Utc::now(), "00");
    assert_eq!(blocker_echo.hdr, blocker.tx_header);
    handle.pkt_received(blocker_echo.clone(), json!({})).await;
    assert_eq!(blocker_task.await.unwrap().unwrap(), blocker_echo);

    wait_until(|| transport.sent().len() >= 2).await;
    assert_eq!(transport.sent()[1].code, Code(0x0002), "high priority dispatches before default");

    let echo_b = Packet::new(Code(0x0002), Verb::I, id("18:111111"), id("01:000002"), None, Utc::now(), "00");
    handle.pkt_received(echo_b.clone(), json!({})).await;
    assert_eq!(tb.await.unwrap().unwrap(), echo_b);

    wait_until(|| transport.sent().len() >= 3).await;
    assert_eq!(
        transport.sent()[2].code,
        Code(0x0001),
        "earlier default-priority command dispatches before the later one"
    );

    let echo_a = Packet::new(Code(0x0001), Verb::I, id("18:111111"), id("01:000001"), None, Utc::now(), "00");
    handle.pkt_received(echo_a.clone(), json!({})).await;
    assert_eq!(ta.await.unwrap().unwrap(), echo_a);

    wait_until(|| transport.sent().len() >= 4).await;
    assert_eq!(transport.sent()[3].code, Code(0x0003));

    let echo_c = Packet::new(Code(0x0003), Verb::I, id("18:111111"), id("01:000003"), None, Utc::now(), "00");
    handle.pkt_received(echo_c.clone(), json!({})).await;
    assert_eq!(tc.await.unwrap().unwrap(), echo_c);
}

#[tokio::test]
async fn sentinel_gateway_id_is_rewritten_before_matching() {
    let (handle, transport) = spawn_handle(ProtocolConfig::default());
    bring_up(&handle, &transport).await;

    let cmd = Command::new(Code(0x10E0), Verb::I, id("18:000730"), id("01:078710"), None, "00", Priority::Default)
        .with_rx_header(None);

    let sender = handle.clone();
    let cmd_for_send = cmd.clone();
    let send_task = tokio::spawn(async move {
        sender
            .send(cmd_for_send, Priority::Default, QosParams::new(Duration::from_secs(2), 1, true))
            .await
    });

    wait_until(|| !transport.sent().is_empty()).await;
    let echo = Packet::new(Code(0x10E0), Verb::I, id("18:111111"), id("01:078710"), None, Utc::now(), "00");
    handle.pkt_received(echo.clone(), json!({})).await;

    let result = send_task.await.unwrap();
    assert_eq!(result.unwrap(), echo);
}

async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within timeout");
}

