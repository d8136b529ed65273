//! Reply assertions for e2e tests

use std::fs;
use std::path::Path;

use serde_json::Value;
use warp::http::StatusCode;

use crate::harness::Reply;

/// Assert a `200 {result}` reply and return the result
pub fn assert_result(reply: &Reply) -> Value {
    assert_eq!(
        reply.status,
        StatusCode::OK,
        "Expected 200, got {} with body {:?}",
        reply.status,
        reply.text()
    );
    let body = reply.json();
    assert!(
        body.get("error").is_none(),
        "Expected a result, got error {}",
        body["error"]
    );
    body.get("result")
        .cloned()
        .unwrap_or_else(|| panic!("Reply has no result: {}", body))
}

/// Assert an `{error}` reply with `status` and return the message
pub fn assert_error(reply: &Reply, status: StatusCode) -> String {
    assert_eq!(
        reply.status, status,
        "Expected {}, got {} with body {:?}",
        status, reply.status, reply.text()
    );
    let body = reply.json();
    body.get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| panic!("Reply has no error message: {}", body))
}

/// Assert a `403` permission failure
pub fn assert_forbidden(reply: &Reply) -> String {
    assert_error(reply, StatusCode::FORBIDDEN)
}

/// Assert that `reply` carries `name: value`
pub fn assert_header(reply: &Reply, name: &str, expected: &str) {
    assert_eq!(
        reply.header(name),
        Some(expected),
        "Header {} mismatch; headers: {:?}",
        name,
        reply.headers
    );
}

/// Assert that a file exists with the expected content
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let actual = fs::read(path).unwrap_or_else(|e| panic!("Failed to read {:?}: {}", path, e));
    assert_eq!(
        actual,
        expected,
        "Content mismatch for {:?}: expected {} bytes, got {} bytes",
        path,
        expected.len(),
        actual.len()
    );
}

/// Assert that a path does not exist at all
pub fn assert_not_exists(path: &Path) {
    assert!(
        !path.exists(),
        "Expected path {:?} to not exist, but it does",
        path
    );
}
