//! Configuration parsing and structures

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::env::substitute_env_vars;
use crate::transport::DEFAULT_TRANSPORT;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Server root directory, substituted for `%DROOT%` in mount destinations
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// HTTP, session and WebSocket settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Capability and group settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Virtual filesystem settings
    pub vfs: RawVfsConfig,

    /// Extension to MIME table; the built-in table is used when absent
    pub mimes: Option<HashMap<String, String>>,

    /// Name of the authenticator module
    #[serde(default = "default_authenticator")]
    pub authenticator: String,

    /// Name of the settings storage module
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Per-module settings, keyed by module name
    #[serde(default)]
    pub modules: ModulesConfig,

    /// Package metadata settings
    #[serde(default)]
    pub packages: PackagesConfig,
}

/// Raw VFS section
#[derive(Debug, Clone, Deserialize)]
pub struct RawVfsConfig {
    /// Mount points keyed by protocol
    pub mounts: BTreeMap<String, RawMount>,

    /// Groups required to access a protocol
    #[serde(default)]
    pub groups: HashMap<String, Vec<String>>,

    /// Reject real paths that escape their mount root
    #[serde(default = "default_true")]
    pub strict_containment: bool,
}

/// A mount entry is either a bare destination or a full object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMount {
    Destination(String),
    Full(RawMountConfig),
}

/// Full mount entry before resolution
#[derive(Debug, Clone, Deserialize)]
pub struct RawMountConfig {
    /// Destination template (may contain placeholders)
    pub destination: String,

    /// Transport name (defaults to the local transport)
    pub transport: Option<String>,

    /// Mount is read-only
    #[serde(default)]
    pub ro: bool,

    /// Mount is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub root_dir: PathBuf,
    pub http: HttpConfig,
    pub api: ApiConfig,
    pub vfs: VfsConfig,
    pub mimes: MimeConfig,
    pub authenticator: String,
    pub storage: String,
    pub modules: ModulesConfig,
    pub packages: PackagesConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub hostname: String,
    pub port: u16,
    /// Directory served as static files
    pub static_dir: PathBuf,
    /// Largest accepted multipart upload, in bytes
    pub upload_limit: u64,
    pub session: SessionConfig,
    pub websocket: WebsocketConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            port: 8000,
            static_dir: PathBuf::from("dist"),
            upload_limit: 1024 * 1024 * 1024,
            session: SessionConfig::default(),
            websocket: WebsocketConfig::default(),
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name carrying the session id
    pub name: String,
    /// Idle lifetime (e.g., "30m", "24h")
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "webdesk.sid".to_string(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// WebSocket endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebsocketConfig {
    pub enabled: bool,
    /// Path segment of the upgrade endpoint
    pub path: String,
}

impl Default for WebsocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "ws".to_string(),
        }
    }
}

/// Treatment of capabilities that have no group mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnmappedPolicy {
    #[default]
    Allow,
    Deny,
}

/// Capability and group configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ApiConfig {
    /// Capability name to required group name
    pub groups: HashMap<String, String>,
    /// Groups assigned to users whose strategy reports none
    pub default_groups: Vec<String>,
    pub unmapped_capabilities: UnmappedPolicy,
}

/// Resolved VFS configuration
#[derive(Debug, Clone)]
pub struct VfsConfig {
    pub mounts: BTreeMap<String, MountConfig>,
    pub groups: HashMap<String, Vec<String>>,
    pub strict_containment: bool,
}

/// Mount point configuration (resolved)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    pub protocol: String,
    pub destination: String,
    pub transport: String,
    pub ro: bool,
    pub enabled: bool,
}

/// Resolved MIME table
#[derive(Debug, Clone)]
pub struct MimeConfig {
    /// Lowercase extension (with leading dot) to MIME type
    pub types: HashMap<String, String>,
    pub default: String,
}

const DEFAULT_MIME: &str = "application/octet-stream";

const BUILTIN_MIMES: &[(&str, &str)] = &[
    (".txt", "text/plain"),
    (".md", "text/markdown"),
    (".html", "text/html"),
    (".htm", "text/html"),
    (".css", "text/css"),
    (".js", "application/javascript"),
    (".json", "application/json"),
    (".xml", "application/xml"),
    (".pdf", "application/pdf"),
    (".zip", "application/zip"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".gif", "image/gif"),
    (".svg", "image/svg+xml"),
    (".mp3", "audio/mpeg"),
    (".ogg", "audio/ogg"),
    (".mp4", "video/mp4"),
    (".webm", "video/webm"),
];

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            types: BUILTIN_MIMES
                .iter()
                .map(|(ext, mime)| (ext.to_string(), mime.to_string()))
                .collect(),
            default: DEFAULT_MIME.to_string(),
        }
    }
}

/// Free-form module settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ModulesConfig {
    pub auth: HashMap<String, serde_yaml::Value>,
    pub storage: HashMap<String, serde_yaml::Value>,
}

/// Package metadata configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PackagesConfig {
    /// System package manifest (JSON)
    pub manifest: Option<PathBuf>,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_authenticator() -> String {
    "demo".to_string()
}

fn default_storage() -> String {
    "memory".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            root_dir,
            http,
            api,
            vfs,
            mimes,
            authenticator,
            storage,
            modules,
            packages,
        } = self;

        let mounts = vfs
            .mounts
            .into_iter()
            .map(|(protocol, raw)| {
                let mount = Self::resolve_mount(&protocol, raw);
                (protocol, mount)
            })
            .collect();

        Ok(Config {
            logging,
            root_dir,
            http,
            api,
            vfs: VfsConfig {
                mounts,
                groups: vfs.groups,
                strict_containment: vfs.strict_containment,
            },
            mimes: Self::resolve_mimes(mimes),
            authenticator,
            storage,
            modules,
            packages,
        })
    }

    fn resolve_mount(protocol: &str, raw: RawMount) -> MountConfig {
        match raw {
            RawMount::Destination(destination) => MountConfig {
                protocol: protocol.to_string(),
                destination,
                transport: DEFAULT_TRANSPORT.to_string(),
                ro: false,
                enabled: true,
            },
            RawMount::Full(full) => MountConfig {
                protocol: protocol.to_string(),
                destination: full.destination,
                transport: full
                    .transport
                    .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string()),
                ro: full.ro,
                enabled: full.enabled,
            },
        }
    }

    fn resolve_mimes(mimes: Option<HashMap<String, String>>) -> MimeConfig {
        let Some(mut table) = mimes else {
            return MimeConfig::default();
        };

        let default = table
            .remove("default")
            .unwrap_or_else(|| DEFAULT_MIME.to_string());

        let types = table
            .into_iter()
            .map(|(ext, mime)| {
                let ext = ext.to_lowercase();
                if ext.starts_with('.') {
                    (ext, mime)
                } else {
                    (format!(".{}", ext), mime)
                }
            })
            .collect();

        MimeConfig { types, default }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}` references
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content)?;
        let raw: RawConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vfs.mounts.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one mount point is required".to_string(),
            ));
        }

        if self.http.port == 0 {
            return Err(ConfigError::ValidationError(
                "http.port cannot be 0".to_string(),
            ));
        }

        for (protocol, mount) in &self.vfs.mounts {
            let valid_name = !protocol.is_empty()
                && protocol
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_name {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid mount protocol {:?}",
                    protocol
                )));
            }

            if mount.destination.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Mount {:?}: destination cannot be empty",
                    protocol
                )));
            }
        }

        for protocol in self.vfs.groups.keys() {
            if !self.vfs.mounts.contains_key(protocol) {
                return Err(ConfigError::ValidationError(format!(
                    "vfs.groups names unknown mount {:?}",
                    protocol
                )));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
