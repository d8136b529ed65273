//! Authentication strategies and authorization checks
//!
//! An [`Authenticator`] verifies credentials and knows a user's groups and
//! package blacklist. The [`Authorizer`] wraps one strategy and performs the
//! session, capability, filesystem and package checks on top of it.

pub mod demo;
pub mod guard;
pub mod static_users;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};

pub use demo::DemoAuthenticator;
pub use guard::{Authorizer, PermissionOptions};
pub use static_users::StaticAuthenticator;

/// Members of this group pass every group check
pub const ADMIN_GROUP: &str = "admin";

/// Authenticated user, sent to the client as `userData`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl User {
    pub fn new(
        id: u64,
        username: impl Into<String>,
        name: impl Into<String>,
        groups: Vec<String>,
    ) -> Self {
        Self {
            id,
            username: username.into(),
            name: name.into(),
            groups,
        }
    }
}

/// Login request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// How a list of required groups is matched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GroupMatch {
    #[default]
    RequireAll,
    RequireAny,
}

/// Check `user_groups` against `required`.
///
/// Admins always pass. An empty requirement always passes.
pub fn has_group(user_groups: &[String], required: &[String], mode: GroupMatch) -> bool {
    if user_groups.iter().any(|g| g == ADMIN_GROUP) {
        return true;
    }

    let member = |group: &String| user_groups.contains(group);
    match mode {
        GroupMatch::RequireAll => required.iter().all(member),
        GroupMatch::RequireAny => required.is_empty() || required.iter().any(member),
    }
}

/// Authentication strategy
///
/// Only `login` is required; the defaults describe a strategy with no groups,
/// no blacklist and no user management.
#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Verify credentials; every failure must read the same to the client
    async fn login(&self, ctx: &RequestContext, credentials: &Credentials) -> Result<User>;

    async fn logout(&self, _ctx: &RequestContext) -> Result<bool> {
        Ok(true)
    }

    async fn get_groups(&self, _ctx: &RequestContext, _username: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_blacklist(&self, _ctx: &RequestContext, _username: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn set_blacklist(
        &self,
        _ctx: &RequestContext,
        _username: &str,
        _list: Vec<String>,
    ) -> Result<bool> {
        Ok(true)
    }

    /// User management (`list`, `add`, `remove`, `edit`, `passwd`)
    async fn manage(&self, _ctx: &RequestContext, command: &str, _args: Value) -> Result<Value> {
        Err(WebdeskError::NotImplemented(format!(
            "user management command {}",
            command
        )))
    }

    async fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

/// Strategy that rejects every login
#[derive(Debug, Default)]
pub struct NullAuthenticator;

#[async_trait]
impl Authenticator for NullAuthenticator {
    fn name(&self) -> &str {
        "none"
    }

    async fn login(&self, _ctx: &RequestContext, _credentials: &Credentials) -> Result<User> {
        Err(WebdeskError::InvalidCredentials)
    }
}
