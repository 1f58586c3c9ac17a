//! End-to-end onion scenarios over real HTTP: deliver, forward, replay,
//! expiry.

use ghosttalk_core::{Message, MessageType, PayloadFrame};
use ghosttalk_router::{build_packet, CircuitHop};
use ghosttalk_tests::{spawn_default_node, unix_millis, unix_seconds, TestNode};

fn payload(recipient: [u8; 32], id: [u8; 32], content: &[u8]) -> PayloadFrame {
    PayloadFrame {
        recipient,
        id,
        timestamp_ms: unix_millis(),
        message_type: MessageType::Text,
        content: content.to_vec(),
    }
}

fn hop(node: &TestNode, expiry: u64, delay_ms: u16) -> CircuitHop {
    CircuitHop {
        encryption_public: node.encryption_public(),
        address: node.addr,
        expiry,
        delay_ms,
    }
}

#[tokio::test]
async fn final_hop_delivers_into_swarm() {
    let node = spawn_default_node().await;
    let client = reqwest::Client::new();

    let recipient = [0x52u8; 32];
    let id = [0x21u8; 32];
    let packet = build_packet(
        &[hop(&node, unix_seconds() + 60, 0)],
        &payload(recipient, id, b"hello!"),
    )
    .unwrap();

    let response = client
        .post(node.url("/v1/onion"))
        .body(packet.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "delivered packets answer 200");

    // The message is now retrievable from this node's swarm store.
    let messages: Vec<Message> = client
        .get(node.url(&format!("/v1/swarm/messages/{}", hex::encode(recipient))))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, id);
    assert_eq!(messages[0].ciphertext, b"hello!");
    assert_eq!(messages[0].message_type, MessageType::Text);
}

#[tokio::test]
async fn intermediate_hop_forwards_to_next_node() {
    let relay = spawn_default_node().await;
    let exit = spawn_default_node().await;
    let client = reqwest::Client::new();

    let recipient = [0x77u8; 32];
    let expiry = unix_seconds() + 60;
    let packet = build_packet(
        &[hop(&relay, expiry, 0), hop(&exit, expiry, 0)],
        &payload(recipient, [0x33u8; 32], b"two hops over http"),
    )
    .unwrap();

    let response = client
        .post(relay.url("/v1/onion"))
        .body(packet.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202, "forwarded packets answer 202");

    // The relay never stored anything; the exit did.
    let at_relay: Vec<Message> = client
        .get(relay.url(&format!("/v1/swarm/messages/{}", hex::encode(recipient))))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(at_relay.is_empty());

    let at_exit: Vec<Message> = client
        .get(exit.url(&format!("/v1/swarm/messages/{}", hex::encode(recipient))))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(at_exit.len(), 1);
    assert_eq!(at_exit[0].ciphertext, b"two hops over http");

    assert_eq!(relay.state.router.stats().snapshot().forwarded, 1);
    assert_eq!(exit.state.router.stats().snapshot().delivered, 1);
}

#[tokio::test]
async fn replayed_packet_is_dropped() {
    let node = spawn_default_node().await;
    let client = reqwest::Client::new();

    let packet = build_packet(
        &[hop(&node, unix_seconds() + 60, 0)],
        &payload([0x01u8; 32], [0x02u8; 32], b"only once"),
    )
    .unwrap();

    let first = client
        .post(node.url("/v1/onion"))
        .body(packet.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(node.url("/v1/onion"))
        .body(packet.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 400);

    let stats = node.state.router.stats().snapshot();
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.replays, 1);
}

#[tokio::test]
async fn expired_packet_is_rejected() {
    let node = spawn_default_node().await;
    let client = reqwest::Client::new();

    let packet = build_packet(
        &[hop(&node, unix_seconds() - 1, 0)],
        &payload([0x01u8; 32], [0x03u8; 32], b"too late"),
    )
    .unwrap();

    let response = client
        .post(node.url("/v1/onion"))
        .body(packet.to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(node.state.router.stats().snapshot().delivered, 0);
}

#[tokio::test]
async fn malformed_packets_are_rejected() {
    let node = spawn_default_node().await;
    let client = reqwest::Client::new();

    // Wrong length
    let response = client
        .post(node.url("/v1/onion"))
        .body(vec![0x01u8; 100])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Right length, garbage content: fails the HMAC with an opaque body
    let response = client
        .post(node.url("/v1/onion"))
        .body(vec![0x01u8; 1280])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "bad packet");
}
