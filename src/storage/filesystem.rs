//! Settings stored as one JSON file per user

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::debug;

use crate::error::{Result, WebdeskError};
use crate::storage::Storage;

#[derive(Debug, Clone, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding `<username>.json`
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(config: FileStorageConfig) -> Self {
        Self { dir: config.path }
    }

    fn settings_file(&self, username: &str) -> Result<PathBuf> {
        let safe = !username.is_empty()
            && username != "."
            && username != ".."
            && !username.contains(|c: char| matches!(c, '/' | '\\' | '\0'));
        if !safe {
            return Err(WebdeskError::InvalidArgument(format!(
                "invalid username {:?}",
                username
            )));
        }
        Ok(self.dir.join(format!("{}.json", username)))
    }
}

#[async_trait]
impl Storage for FileStorage {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn get_settings(&self, username: &str) -> Result<Value> {
        let file = self.settings_file(username)?;
        match fs::read(&file).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no settings stored for {}", username);
                Ok(Value::Object(Map::new()))
            }
            Err(e) => Err(WebdeskError::from_io(e, &file)),
        }
    }

    async fn set_settings(&self, username: &str, settings: Value) -> Result<bool> {
        let file = self.settings_file(username)?;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WebdeskError::from_io(e, &self.dir))?;
        let data = serde_json::to_vec_pretty(&settings)?;
        fs::write(&file, data)
            .await
            .map_err(|e| WebdeskError::from_io(e, &file))?;
        Ok(true)
    }
}
