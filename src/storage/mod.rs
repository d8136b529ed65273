//! Per-user settings storage

pub mod filesystem;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use filesystem::FileStorage;
pub use memory::MemoryStorage;

/// Settings backend, selected by the `storage` config key
#[async_trait]
pub trait Storage: Send + Sync {
    fn name(&self) -> &str;

    /// Stored settings, or an empty object when none are saved
    async fn get_settings(&self, username: &str) -> Result<Value>;

    /// Replace the stored settings
    async fn set_settings(&self, username: &str, settings: Value) -> Result<bool>;

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}
