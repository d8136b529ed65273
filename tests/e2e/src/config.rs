//! Configuration builder for e2e tests
//!
//! Generates YAML in the format `webdesk::config::Config` reads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use webdesk::auth::static_users::hash_password;

/// Password every generated user logs in with
pub const TEST_PASSWORD: &str = "secret";

/// Group every generated user gets so `fs` checks pass
pub const FS_GROUP: &str = "fs";

/// A mount entry
#[derive(Debug, Clone, Serialize)]
pub struct MountConfig {
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
    pub ro: bool,
    pub enabled: bool,
}

impl MountConfig {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            transport: None,
            ro: false,
            enabled: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.ro = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A user of the static authenticator
#[derive(Debug, Clone, Serialize)]
pub struct UserConfig {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub password: String,
    pub groups: Vec<String>,
    pub blacklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct LoggingConfig {
    level: String,
}

#[derive(Debug, Clone, Serialize)]
struct WebsocketConfig {
    enabled: bool,
    path: String,
}

#[derive(Debug, Clone, Serialize)]
struct HttpConfig {
    hostname: String,
    port: u16,
    static_dir: PathBuf,
    websocket: WebsocketConfig,
}

#[derive(Debug, Clone, Serialize)]
struct ApiConfig {
    groups: BTreeMap<String, String>,
    unmapped_capabilities: String,
}

#[derive(Debug, Clone, Serialize)]
struct VfsConfig {
    mounts: BTreeMap<String, MountConfig>,
    groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
struct StaticModule {
    users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Serialize)]
struct AuthModules {
    #[serde(rename = "static")]
    static_users: StaticModule,
}

#[derive(Debug, Clone, Serialize)]
struct ModulesConfig {
    auth: AuthModules,
}

#[derive(Debug, Clone, Serialize)]
struct PackagesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest: Option<PathBuf>,
}

/// Complete test configuration
#[derive(Debug, Clone, Serialize)]
pub struct TestConfig {
    logging: LoggingConfig,
    root_dir: PathBuf,
    http: HttpConfig,
    api: ApiConfig,
    vfs: VfsConfig,
    authenticator: String,
    storage: String,
    modules: ModulesConfig,
    packages: PackagesConfig,
}

impl TestConfig {
    pub fn builder(root: &Path) -> TestConfigBuilder {
        TestConfigBuilder::new(root)
    }

    /// Generate YAML string
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Write config to a file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn users(&self) -> &[UserConfig] {
        &self.modules.auth.static_users.users
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn static_dir(&self) -> &Path {
        &self.http.static_dir
    }

    pub fn websocket_path(&self) -> &str {
        &self.http.websocket.path
    }
}

/// Builder for test configurations
pub struct TestConfigBuilder {
    config: TestConfig,
}

impl TestConfigBuilder {
    /// Defaults: `home` per-user mount, read-only `shared` mount, static
    /// authenticator with no users, system manifest at `dist/packages.json`
    pub fn new(root: &Path) -> Self {
        let mut mounts = BTreeMap::new();
        mounts.insert(
            "home".to_string(),
            MountConfig::new("%DROOT%/home/%USERNAME%"),
        );
        mounts.insert(
            "shared".to_string(),
            MountConfig::new("%DROOT%/shared").read_only(),
        );

        Self {
            config: TestConfig {
                logging: LoggingConfig {
                    level: "debug".to_string(),
                },
                root_dir: root.to_path_buf(),
                http: HttpConfig {
                    hostname: "127.0.0.1".to_string(),
                    port: 8000,
                    static_dir: root.join("dist"),
                    websocket: WebsocketConfig {
                        enabled: true,
                        path: "ws".to_string(),
                    },
                },
                api: ApiConfig {
                    groups: BTreeMap::new(),
                    unmapped_capabilities: "allow".to_string(),
                },
                vfs: VfsConfig {
                    mounts,
                    groups: BTreeMap::new(),
                },
                authenticator: "static".to_string(),
                storage: "memory".to_string(),
                modules: ModulesConfig {
                    auth: AuthModules {
                        static_users: StaticModule { users: Vec::new() },
                    },
                },
                packages: PackagesConfig {
                    manifest: Some(root.join("dist").join("packages.json")),
                },
            },
        }
    }

    pub fn logging_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    /// Add a user with [`TEST_PASSWORD`]; `fs` is always added to `groups`
    pub fn add_user(mut self, username: &str, groups: &[&str], blacklist: &[&str]) -> Self {
        let users = &mut self.config.modules.auth.static_users.users;
        let mut groups: Vec<String> = groups.iter().map(|g| g.to_string()).collect();
        if !groups.iter().any(|g| g == FS_GROUP) {
            groups.push(FS_GROUP.to_string());
        }

        users.push(UserConfig {
            id: users.len() as u64 + 1,
            username: username.to_string(),
            name: username.to_string(),
            password: hash_password(TEST_PASSWORD),
            groups,
            blacklist: blacklist.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    pub fn add_mount(mut self, protocol: &str, mount: MountConfig) -> Self {
        self.config.vfs.mounts.insert(protocol.to_string(), mount);
        self
    }

    /// Require `groups` to access `protocol`
    pub fn mount_groups(mut self, protocol: &str, groups: &[&str]) -> Self {
        self.config.vfs.groups.insert(
            protocol.to_string(),
            groups.iter().map(|g| g.to_string()).collect(),
        );
        self
    }

    /// Map `capability` to a required group
    pub fn capability_group(mut self, capability: &str, group: &str) -> Self {
        self.config
            .api
            .groups
            .insert(capability.to_string(), group.to_string());
        self
    }

    pub fn deny_unmapped_capabilities(mut self) -> Self {
        self.config.api.unmapped_capabilities = "deny".to_string();
        self
    }

    pub fn websocket(mut self, enabled: bool) -> Self {
        self.config.http.websocket.enabled = enabled;
        self
    }

    pub fn package_manifest(mut self, path: PathBuf) -> Self {
        self.config.packages.manifest = Some(path);
        self
    }

    pub fn build(self) -> TestConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_to_yaml() {
        let config = TestConfig::builder(Path::new("/tmp/webdesk-test"))
            .add_user("alice", &["users"], &["default/Secret"])
            .build();

        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("authenticator: static"));
        assert!(yaml.contains("%DROOT%/home/%USERNAME%"));
        assert!(yaml.contains("sha256:"));

        let parsed = webdesk::config::Config::from_str(&yaml).unwrap();
        assert!(parsed.vfs.mounts["shared"].ro);
        assert_eq!(parsed.http.static_dir, PathBuf::from("/tmp/webdesk-test/dist"));
    }

    #[test]
    fn test_users_always_get_fs_group() {
        let config = TestConfig::builder(Path::new("/tmp"))
            .add_user("bob", &[], &[])
            .add_user("carol", &["fs", "admin"], &[])
            .build();

        assert_eq!(config.users()[0].groups, vec!["fs"]);
        assert_eq!(config.users()[1].groups, vec!["fs", "admin"]);
        assert_eq!(config.users()[1].id, 2);
    }
}
