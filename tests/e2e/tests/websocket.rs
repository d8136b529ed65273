//! The WebSocket protocol shares routes and sessions with HTTP

mod common;

use common::*;
use serde_json::json;

#[tokio::test]
async fn test_login_over_socket() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let client = harness.client();
    let mut socket = client.socket().await?;

    let reply = socket
        .request(
            "/API/login",
            json!({ "username": "alice", "password": TEST_PASSWORD }),
        )
        .await?;
    assert_eq!(reply["result"]["userData"]["username"], "alice");
    assert_eq!(reply["_index"], 1);

    let reply = socket
        .request("/FS/exists", json!({ "path": "home:///" }))
        .await?;
    assert_eq!(reply, json!({ "result": true, "_index": 2 }));

    harness.cleanup().await
}

#[tokio::test]
async fn test_socket_reuses_http_session() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;
    create_file_str(&harness.home_dir("alice").join("hello.txt"), "hi")?;
    let mut socket = client.socket().await?;

    let reply = socket
        .request("/FS/read", json!({ "path": "home:///hello.txt" }))
        .await?;
    assert_eq!(reply["result"], "data:text/plain;base64,aGk=");

    let reply = socket
        .request("/FS/scandir", json!({ "path": "home:///" }))
        .await?;
    assert_eq!(reply["result"][0]["filename"], "hello.txt");

    // permission failures carry the same message as over HTTP
    let reply = socket
        .request("/FS/write", json!({ "path": "shared:///x", "data": "x" }))
        .await?;
    assert_eq!(reply["error"], "Permission denied for: fs, write");

    harness.cleanup().await
}

#[tokio::test]
async fn test_socket_without_session() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let client = harness.client();
    let mut socket = client.socket().await?;

    let reply = socket
        .request("/FS/scandir", json!({ "path": "home:///" }))
        .await?;
    assert_eq!(reply["error"], "You have no session, please log in!");

    harness.cleanup().await
}

#[tokio::test]
async fn test_unknown_route_replies_with_error() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;
    let mut socket = client.socket().await?;

    socket
        .send_raw(json!({ "path": "/API/nope", "args": {}, "_index": "abc" }))
        .await;
    let reply = socket.recv().await?;
    assert_eq!(reply["_index"], "abc");
    assert_eq!(reply["error"], "No such route: /API/nope");

    harness.cleanup().await
}

#[tokio::test]
async fn test_broadcast_reaches_user_sockets() -> anyhow::Result<()> {
    let (harness, alice) = logged_in("alice").await?;
    let mut alice_socket = alice.socket().await?;

    let bob = harness.client();
    bob.login("bob").await?;
    let mut bob_socket = bob.socket().await?;

    // a round trip guarantees both sockets are registered
    alice_socket.request("/FS/exists", json!({ "path": "home:///" })).await?;
    bob_socket.request("/FS/exists", json!({ "path": "home:///" })).await?;

    let sent = harness.app().connections.broadcast(
        Some("alice"),
        "vfs:watch",
        json!({ "path": "home:///hello.txt" }),
    );
    assert_eq!(sent, 1);

    let frame = alice_socket.recv().await?;
    assert_eq!(frame["action"], "vfs:watch");
    assert_eq!(frame["args"]["path"], "home:///hello.txt");

    harness.cleanup().await
}

#[tokio::test]
async fn test_closing_replaced_socket_keeps_the_newer_one() -> anyhow::Result<()> {
    let (harness, alice) = logged_in("alice").await?;

    let mut first = alice.socket().await?;
    first.request("/FS/exists", json!({ "path": "home:///" })).await?;
    let mut second = alice.socket().await?;
    second.request("/FS/exists", json!({ "path": "home:///" })).await?;

    drop(first);
    // let the server notice the first socket going away
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let sent = harness
        .app()
        .connections
        .broadcast(Some("alice"), "vfs:watch", json!({ "path": "home:///" }));
    assert_eq!(sent, 1);
    let frame = second.recv().await?;
    assert_eq!(frame["action"], "vfs:watch");

    harness.cleanup().await
}
