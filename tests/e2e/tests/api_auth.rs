//! Login, sessions and capability checks on `/API/*`

mod common;

use common::*;
use serde_json::json;
use warp::http::StatusCode;

#[tokio::test]
async fn test_login_returns_user_data_and_sets_cookie() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let client = harness.client();

    let reply = client
        .post(
            "/API/login",
            json!({ "username": "bob", "password": TEST_PASSWORD }),
        )
        .await;
    let result = assert_result(&reply);

    assert_eq!(result["userData"]["username"], "bob");
    assert_eq!(result["userData"]["id"], 2);
    assert_eq!(result["userData"]["groups"], json!(["users", "fs"]));
    assert_eq!(result["blacklistedPackages"], json!(["default/Secret"]));
    assert!(result["userSettings"].is_object());

    let cookie = client.cookie().expect("session cookie");
    assert!(cookie.starts_with("webdesk.sid="));

    // the same session is reused afterwards
    let reply = client.call("scandir", json!({ "path": "home:///" })).await;
    assert_result(&reply);
    assert!(reply.header("set-cookie").is_none());

    harness.cleanup().await
}

#[tokio::test]
async fn test_invalid_credentials_are_indistinguishable() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let client = harness.client();

    let wrong_password = client
        .post("/API/login", json!({ "username": "alice", "password": "nope" }))
        .await;
    let unknown_user = client
        .post("/API/login", json!({ "username": "mallory", "password": TEST_PASSWORD }))
        .await;

    assert_eq!(assert_error(&wrong_password, StatusCode::OK), "Invalid credentials");
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(wrong_password.status, unknown_user.status);

    harness.cleanup().await
}

#[tokio::test]
async fn test_requests_without_session_are_forbidden() -> anyhow::Result<()> {
    let harness = TestHarness::new().await?;
    let client = harness.client();

    let message = assert_forbidden(&client.call("scandir", json!({ "path": "home:///" })).await);
    assert_eq!(message, "You have no session, please log in!");
    assert_forbidden(&client.post("/API/settings", json!({ "settings": {} })).await);

    harness.cleanup().await
}

#[tokio::test]
async fn test_logout_ends_session() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    assert_result(&client.call("exists", json!({ "path": "home:///" })).await);
    assert_eq!(assert_result(&client.post("/API/logout", json!({})).await), json!(true));
    assert_forbidden(&client.call("exists", json!({ "path": "home:///" })).await);

    harness.cleanup().await
}

#[tokio::test]
async fn test_settings_survive_relogin() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let reply = client
        .post("/API/settings", json!({ "settings": { "theme": "dark" } }))
        .await;
    assert_eq!(assert_result(&reply), json!(true));

    let other = harness.client();
    let result = other.login("alice").await?;
    assert_eq!(result["userSettings"], json!({ "theme": "dark" }));

    harness.cleanup().await
}

#[tokio::test]
async fn test_unmapped_capability_is_allowed() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let reply = client
        .post("/API/packages", json!({ "command": "list", "args": {} }))
        .await;
    assert!(assert_result(&reply).is_object());

    let reply = client
        .post("/API/packages", json!({ "command": "explode" }))
        .await;
    assert_eq!(assert_error(&reply, StatusCode::OK), "No such command");

    harness.cleanup().await
}

#[tokio::test]
async fn test_unmapped_capability_denied_when_configured() -> anyhow::Result<()> {
    let harness = TestHarness::with_config(|b| b.deny_unmapped_capabilities()).await?;
    let client = harness.client();
    client.login("alice").await?;

    let reply = client
        .post("/API/packages", json!({ "command": "list" }))
        .await;
    assert_eq!(assert_forbidden(&reply), "Permission denied for: packages");

    // fs is always mapped
    assert_result(&client.call("exists", json!({ "path": "home:///" })).await);

    harness.cleanup().await
}

#[tokio::test]
async fn test_mapped_capability_requires_group() -> anyhow::Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.capability_group("users", "admins")
            .add_user("root", &["admins"], &[])
    })
    .await?;

    let alice = harness.client();
    alice.login("alice").await?;
    let reply = alice.post("/API/users", json!({ "command": "list" })).await;
    assert_eq!(assert_forbidden(&reply), "Permission denied for: users");

    let root = harness.client();
    root.login("root").await?;
    let users = assert_result(&root.post("/API/users", json!({ "command": "list" })).await);
    let names: Vec<&str> = users
        .as_array()
        .expect("user list")
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert_eq!(names, vec!["alice", "bob", "root"]);

    harness.cleanup().await
}

#[tokio::test]
async fn test_unknown_application_api() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let reply = client
        .post(
            "/API/application",
            json!({ "path": "default/Nope", "method": "ping", "args": {} }),
        )
        .await;
    assert_eq!(
        assert_error(&reply, StatusCode::OK),
        "Failed to load Application API for: default/Nope"
    );

    harness.cleanup().await
}
