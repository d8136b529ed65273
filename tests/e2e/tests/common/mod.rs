//! Common test utilities and fixtures
//!
//! Every test builds its own [`TestHarness`] over a fresh temp directory, so
//! tests run in parallel without sharing sessions or files.

#![allow(dead_code)]

pub use webdesk_e2e::*;

use std::fs;
use std::path::Path;

// ============================================================================
// File utilities
// ============================================================================

/// Create a test file with content, creating parent directories
pub fn create_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
}

/// Create a test file with string content
pub fn create_file_str(path: &Path, content: &str) -> std::io::Result<()> {
    create_file(path, content.as_bytes())
}

/// Read file content as string
pub fn read_file_str(path: &Path) -> std::io::Result<String> {
    fs::read_to_string(path)
}

/// Default harness plus a client logged in as `username`
pub async fn logged_in(username: &str) -> anyhow::Result<(TestHarness, Client)> {
    let harness = TestHarness::new().await?;
    let client = harness.client();
    client.login(username).await?;
    Ok((harness, client))
}

// ============================================================================
// Macros for test patterns
// ============================================================================

/// Test with a default harness and a client logged in as `alice`.
///
/// # Example
/// ```ignore
/// harness_test!(test_my_feature, |harness, client| async move {
///     let reply = client.call("scandir", json!({ "path": "home:///" })).await;
///     assert_result(&reply);
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! harness_test {
    ($test_name:ident, $body:expr) => {
        #[tokio::test]
        async fn $test_name() -> anyhow::Result<()> {
            let (harness, client) = $crate::common::logged_in("alice").await?;
            let result: anyhow::Result<()> = $body(&harness, &client).await;
            harness.cleanup().await?;
            result
        }
    };
}
