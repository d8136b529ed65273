//! User table strategy
//!
//! Users come from the `modules.auth.static.users` list. Passwords are
//! stored as `sha256:<hex>`. The table can be edited at runtime through
//! [`Authenticator::manage`]; edits are not persisted.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::auth::{Authenticator, Credentials, User};
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};

const HASH_PREFIX: &str = "sha256:";

/// Compared against for unknown usernames so every attempt costs one hash
static UNKNOWN_USER_DIGEST: Lazy<String> = Lazy::new(|| hash_password(""));

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticConfig {
    pub users: Vec<StaticUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    /// `sha256:<hex>`; an empty hash never matches
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

impl StaticUser {
    fn to_user(&self) -> User {
        let name = if self.name.is_empty() {
            self.username.clone()
        } else {
            self.name.clone()
        };
        User::new(self.id, self.username.clone(), name, self.groups.clone())
    }
}

/// `sha256:<hex>` of a password
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", HASH_PREFIX, hex)
}

fn verify_password(password: &str, stored: &str) -> bool {
    let computed = hash_password(password);
    if !stored.starts_with(HASH_PREFIX) {
        return false;
    }
    computed.len() == stored.len()
        && computed
            .bytes()
            .zip(stored.to_ascii_lowercase().bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[derive(Debug, Deserialize)]
struct UserArgs {
    #[serde(default, rename = "_username")]
    previous_username: Option<String>,
    username: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    groups: Option<Vec<String>>,
    #[serde(default)]
    password: Option<String>,
}

pub struct StaticAuthenticator {
    users: RwLock<Vec<StaticUser>>,
}

impl StaticAuthenticator {
    pub fn new(config: StaticConfig) -> Self {
        info!("Loaded {} static user(s)", config.users.len());
        Self {
            users: RwLock::new(config.users),
        }
    }

    fn find<T>(&self, username: &str, f: impl FnOnce(&StaticUser) -> T) -> Option<T> {
        self.users.read().iter().find(|u| u.username == username).map(f)
    }

    fn list(&self) -> Value {
        let users: Vec<User> = self.users.read().iter().map(StaticUser::to_user).collect();
        json!(users)
    }

    fn add(&self, args: UserArgs) -> Result<Value> {
        let mut users = self.users.write();
        if users.iter().any(|u| u.username == args.username) {
            return Err(WebdeskError::AlreadyExists(args.username));
        }

        let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        let user = StaticUser {
            id,
            name: args.name.unwrap_or_else(|| args.username.clone()),
            password: args.password.as_deref().map(hash_password).unwrap_or_default(),
            groups: args.groups.unwrap_or_default(),
            blacklist: Vec::new(),
            username: args.username,
        };
        info!("Added user {}", user.username);
        let created = user.to_user();
        users.push(user);
        Ok(json!(created))
    }

    fn remove(&self, args: UserArgs) -> Result<Value> {
        let mut users = self.users.write();
        let before = users.len();
        users.retain(|u| u.username != args.username);
        if users.len() == before {
            return Err(WebdeskError::NotFound(args.username));
        }
        info!("Removed user {}", args.username);
        Ok(json!(true))
    }

    fn edit(&self, args: UserArgs) -> Result<Value> {
        let mut users = self.users.write();
        let lookup = args
            .previous_username
            .clone()
            .unwrap_or_else(|| args.username.clone());

        if lookup != args.username && users.iter().any(|u| u.username == args.username) {
            return Err(WebdeskError::AlreadyExists(args.username));
        }

        let user = users
            .iter_mut()
            .find(|u| u.username == lookup)
            .ok_or(WebdeskError::NotFound(lookup))?;
        user.username = args.username;
        if let Some(name) = args.name {
            user.name = name;
        }
        if let Some(groups) = args.groups {
            user.groups = groups;
        }
        Ok(json!(user.to_user()))
    }

    fn passwd(&self, args: UserArgs) -> Result<Value> {
        let password = args
            .password
            .ok_or_else(|| WebdeskError::InvalidArgument("missing password".to_string()))?;
        let mut users = self.users.write();
        let user = users
            .iter_mut()
            .find(|u| u.username == args.username)
            .ok_or(WebdeskError::NotFound(args.username))?;
        user.password = hash_password(&password);
        Ok(json!(true))
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn name(&self) -> &str {
        "static"
    }

    async fn login(&self, _ctx: &RequestContext, credentials: &Credentials) -> Result<User> {
        let found = self.find(&credentials.username, |u| (u.password.clone(), u.to_user()));
        let stored = found
            .as_ref()
            .map_or(UNKNOWN_USER_DIGEST.as_str(), |(digest, _)| digest.as_str());
        let verified = verify_password(&credentials.password, stored);

        match found {
            Some((_, user)) if verified => Ok(user),
            _ => Err(WebdeskError::InvalidCredentials),
        }
    }

    async fn get_groups(&self, _ctx: &RequestContext, username: &str) -> Result<Vec<String>> {
        Ok(self.find(username, |u| u.groups.clone()).unwrap_or_default())
    }

    async fn get_blacklist(&self, _ctx: &RequestContext, username: &str) -> Result<Vec<String>> {
        Ok(self.find(username, |u| u.blacklist.clone()).unwrap_or_default())
    }

    async fn set_blacklist(
        &self,
        _ctx: &RequestContext,
        username: &str,
        list: Vec<String>,
    ) -> Result<bool> {
        let mut users = self.users.write();
        match users.iter_mut().find(|u| u.username == username) {
            Some(user) => {
                user.blacklist = list;
                Ok(true)
            }
            None => Err(WebdeskError::NotFound(username.to_string())),
        }
    }

    async fn manage(&self, _ctx: &RequestContext, command: &str, args: Value) -> Result<Value> {
        if command == "list" {
            return Ok(self.list());
        }

        let args: UserArgs = serde_json::from_value(args)?;
        match command {
            "add" => self.add(args),
            "remove" => self.remove(args),
            "edit" => self.edit(args),
            "passwd" => self.passwd(args),
            other => Err(WebdeskError::NoSuchMethod(other.to_string())),
        }
    }
}
