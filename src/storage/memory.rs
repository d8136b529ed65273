use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::storage::Storage;

/// Settings kept for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStorage {
    settings: DashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_settings(&self, username: &str) -> Result<Value> {
        Ok(self
            .settings
            .get(username)
            .map(|v| v.clone())
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn set_settings(&self, username: &str, settings: Value) -> Result<bool> {
        self.settings.insert(username.to_string(), settings);
        Ok(true)
    }

    async fn destroy(&self) -> Result<()> {
        self.settings.clear();
        Ok(())
    }
}
