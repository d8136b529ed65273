//! Mount restrictions and uploads

mod common;

use common::*;
use serde_json::{json, Value};
use test_case::test_case;
use warp::http::StatusCode;

#[test_case("write", json!({ "path": "shared:///new.txt", "data": "x" }), "fs, write" ; "write")]
#[test_case("mkdir", json!({ "path": "shared:///dir" }), "fs, mkdir" ; "mkdir")]
#[test_case("unlink", json!({ "path": "shared:///readme.txt" }), "fs, delete" ; "unlink")]
#[test_case("copy", json!({ "src": "home:///a.txt", "dest": "shared:///a.txt" }), "fs, copy" ; "copy into")]
#[test_case("move", json!({ "src": "home:///a.txt", "dest": "shared:///a.txt" }), "fs, move" ; "move into")]
#[tokio::test]
async fn test_read_only_mount_denies(method: &str, args: Value, denied: &str) -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;
    create_file_str(&harness.home_dir("alice").join("a.txt"), "a")?;

    let message = assert_forbidden(&client.call(method, args).await);
    assert_eq!(message, format!("Permission denied for: {}", denied));

    assert_file_content(&harness.shared_dir().join("readme.txt"), b"shared notes");
    assert_not_exists(&harness.shared_dir().join("a.txt"));

    harness.cleanup().await
}

#[tokio::test]
async fn test_copy_out_of_read_only_mount() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let reply = client
        .call(
            "copy",
            json!({ "src": "shared:///readme.txt", "dest": "home:///readme.txt" }),
        )
        .await;
    assert_eq!(assert_result(&reply), json!(true));
    assert_file_content(&harness.home_dir("alice").join("readme.txt"), b"shared notes");

    harness.cleanup().await
}

#[tokio::test]
async fn test_mount_groups_and_disabled_mounts() -> anyhow::Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_mount("secret", MountConfig::new("%DROOT%/secret"))
            .mount_groups("secret", &["staff"])
            .add_mount("old", MountConfig::new("%DROOT%/old").disabled())
            .add_user("carol", &["staff"], &[])
    })
    .await?;

    let alice = harness.client();
    alice.login("alice").await?;
    let message = assert_forbidden(&alice.call("exists", json!({ "path": "secret:///" })).await);
    assert_eq!(message, "Permission denied for: fs, exists");

    let carol = harness.client();
    carol.login("carol").await?;
    let reply = carol.call("exists", json!({ "path": "secret:///" })).await;
    assert_eq!(assert_result(&reply), json!(false));

    assert_forbidden(&carol.call("exists", json!({ "path": "old:///" })).await);

    harness.cleanup().await
}

#[tokio::test]
async fn test_admin_bypasses_mount_restrictions() -> anyhow::Result<()> {
    let harness = TestHarness::with_config(|b| b.add_user("boss", &["admin"], &[])).await?;
    let client = harness.client();
    client.login("boss").await?;

    let reply = client
        .call("write", json!({ "path": "shared:///notice.txt", "data": "hi" }))
        .await;
    assert_eq!(assert_result(&reply), json!(2));
    assert_file_content(&harness.shared_dir().join("notice.txt"), b"hi");

    harness.cleanup().await
}

#[tokio::test]
async fn test_reserved_protocol_is_rejected() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let message = assert_forbidden(&client.call("scandir", json!({ "path": "$:///etc" })).await);
    assert!(message.contains("reserved"), "{}", message);

    harness.cleanup().await
}

#[tokio::test]
async fn test_upload() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;
    let content = b"\x00\x01binary\xff";

    let reply = client.upload("home:///", "blob.bin", content, false).await;
    assert_eq!(assert_result(&reply), json!(["home:///blob.bin"]));
    assert_file_content(&harness.home_dir("alice").join("blob.bin"), content);

    let reply = client.upload("home:///", "blob.bin", b"again", false).await;
    assert_eq!(
        assert_error(&reply, StatusCode::OK),
        "Path already exists: home:///blob.bin"
    );

    let reply = client.upload("home:///", "blob.bin", b"again", true).await;
    assert_result(&reply);
    assert_file_content(&harness.home_dir("alice").join("blob.bin"), b"again");

    harness.cleanup().await
}

#[tokio::test]
async fn test_upload_keeps_only_basename() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;
    std::fs::create_dir_all(harness.home_dir("alice").join("docs"))?;

    let reply = client
        .upload("home:///docs", "../../../escape.txt", b"x", false)
        .await;
    assert_eq!(assert_result(&reply), json!(["home:///docs/escape.txt"]));
    assert_file_content(&harness.home_dir("alice").join("docs").join("escape.txt"), b"x");

    harness.cleanup().await
}

#[tokio::test]
async fn test_upload_denied() -> anyhow::Result<()> {
    let (harness, client) = logged_in("alice").await?;

    let message = assert_forbidden(&client.upload("shared:///", "x.txt", b"x", false).await);
    assert_eq!(message, "Permission denied for: fs, upload");
    assert_not_exists(&harness.shared_dir().join("x.txt"));

    let anonymous = harness.client();
    assert_forbidden(&anonymous.upload("home:///", "x.txt", b"x", false).await);

    harness.cleanup().await
}
