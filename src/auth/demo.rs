//! Demo strategy: any non-empty username logs in

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::auth::{Authenticator, Credentials, User};
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Groups given to every demo user
    pub groups: Vec<String>,
}

#[derive(Debug, Default)]
pub struct DemoAuthenticator {
    config: DemoConfig,
}

impl DemoAuthenticator {
    pub fn new(config: DemoConfig) -> Self {
        Self { config }
    }
}

/// Stable id derived from the username
fn demo_user_id(username: &str) -> u64 {
    let digest = Sha256::digest(username.as_bytes());
    let mut id = [0u8; 8];
    id.copy_from_slice(&digest[..8]);
    // keep ids positive for JSON clients
    u64::from_be_bytes(id) >> 11
}

#[async_trait]
impl Authenticator for DemoAuthenticator {
    fn name(&self) -> &str {
        "demo"
    }

    async fn login(&self, _ctx: &RequestContext, credentials: &Credentials) -> Result<User> {
        let username = credentials.username.trim();
        if username.is_empty() {
            return Err(WebdeskError::InvalidCredentials);
        }

        Ok(User::new(
            demo_user_id(username),
            username,
            username,
            self.config.groups.clone(),
        ))
    }

    async fn get_groups(&self, _ctx: &RequestContext, _username: &str) -> Result<Vec<String>> {
        Ok(self.config.groups.clone())
    }
}
