//! Reads over HTTP: whole files, ranges, downloads and data URLs

mod common;

use common::*;
use serde_json::json;
use warp::http::StatusCode;

const CONTENT: &str = "hello world";

async fn setup() -> anyhow::Result<(TestHarness, Client)> {
    let (harness, client) = logged_in("alice").await?;
    create_file_str(&harness.home_dir("alice").join("hello.txt"), CONTENT)?;
    Ok((harness, client))
}

#[tokio::test]
async fn test_read_whole_file() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client.get("/FS/read?path=home:///hello.txt").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), CONTENT);
    assert_header(&reply, "content-type", "text/plain");
    assert_header(&reply, "accept-ranges", "bytes");
    assert_header(&reply, "content-length", "11");
    assert!(reply.header("content-disposition").is_none());

    harness.cleanup().await
}

#[tokio::test]
async fn test_read_range() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;
    let path = "/FS/read?path=home:///hello.txt";

    let reply = client.get_range(path, "bytes=0-4").await;
    assert_eq!(reply.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(reply.text(), "hello");
    assert_header(&reply, "content-range", "bytes 0-4/11");
    assert_header(&reply, "content-length", "5");

    let reply = client.get_range(path, "bytes=6-").await;
    assert_eq!(reply.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(reply.text(), "world");

    let reply = client.get_range(path, "bytes=-5").await;
    assert_eq!(reply.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(reply.text(), "world");
    assert_header(&reply, "content-range", "bytes 6-10/11");

    harness.cleanup().await
}

#[tokio::test]
async fn test_unsatisfiable_range() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    for range in ["bytes=20-30", "bytes=5-2", "bytes=0-11", "chars=0-1"] {
        let reply = client.get_range("/FS/read?path=home:///hello.txt", range).await;
        let message = assert_error(&reply, StatusCode::RANGE_NOT_SATISFIABLE);
        assert!(message.contains("bytes */11"), "{}: {}", range, message);
    }

    harness.cleanup().await
}

#[tokio::test]
async fn test_download_ignores_range() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client
        .get_range("/FS/read?path=home:///hello.txt&download=true", "bytes=0-4")
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), CONTENT);
    assert_header(
        &reply,
        "content-disposition",
        "attachment; filename=\"hello.txt\"",
    );

    harness.cleanup().await
}

#[tokio::test]
async fn test_non_raw_read_is_data_url() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client
        .call(
            "read",
            json!({ "path": "home:///hello.txt", "options": { "raw": false } }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "data:text/plain;base64,aGVsbG8gd29ybGQ=");

    harness.cleanup().await
}

#[tokio::test]
async fn test_read_missing_file() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client.get("/FS/read?path=home:///missing.txt").await;
    let message = assert_error(&reply, StatusCode::OK);
    assert!(message.contains("home:///missing.txt"), "{}", message);

    // unknown protocols fail the mount check
    let reply = client.get("/FS/read?path=nowhere:///x").await;
    let message = assert_forbidden(&reply);
    assert!(message.starts_with("Invalid path"), "{}", message);

    harness.cleanup().await
}

#[tokio::test]
async fn test_read_only_mount_is_readable() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client.get("/FS/read?path=shared:///readme.txt").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "shared notes");

    let listing = assert_result(&client.call("scandir", json!({ "path": "shared:///" })).await);
    assert_eq!(listing[0]["filename"], "readme.txt");

    harness.cleanup().await
}

#[tokio::test]
async fn test_write_then_scandir() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client
        .call("write", json!({ "path": "home:///notes.txt", "data": "abc" }))
        .await;
    assert_eq!(assert_result(&reply), json!(3));
    assert_file_content(&harness.home_dir("alice").join("notes.txt"), b"abc");

    assert_result(&client.call("mkdir", json!({ "path": "home:///docs" })).await);

    let listing = assert_result(&client.call("scandir", json!({ "path": "home:///" })).await);
    let names: Vec<&str> = listing
        .as_array()
        .expect("listing")
        .iter()
        .filter_map(|e| e["filename"].as_str())
        .collect();
    assert_eq!(names, vec!["docs", "hello.txt", "notes.txt"]);
    assert_eq!(listing[0]["isDirectory"], true);
    assert_eq!(listing[1]["path"], "home:///hello.txt");
    assert_eq!(listing[1]["mime"], "text/plain");

    harness.cleanup().await
}

#[tokio::test]
async fn test_paths_are_clamped_to_mount_root() -> anyhow::Result<()> {
    let (harness, client) = setup().await?;

    let reply = client
        .call("write", json!({ "path": "home:///../../escape.txt", "data": "x" }))
        .await;
    assert_result(&reply);
    assert_file_content(&harness.home_dir("alice").join("escape.txt"), b"x");
    assert_not_exists(&harness.root().join("home").join("escape.txt"));
    assert_not_exists(&harness.root().join("escape.txt"));

    let reply = client
        .call("exists", json!({ "path": "home:///../hello.txt" }))
        .await;
    assert_eq!(assert_result(&reply), json!(true));

    harness.cleanup().await
}
