//! Virtual path parsing and real path resolution

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{trace, warn};

use crate::config::{Config, MountConfig};
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::transport::{DEFAULT_TRANSPORT, HTTP_TRANSPORT};
use crate::vfs::mime::MimeTable;

/// Protocol usable only from internal contexts; maps onto `/`
pub const INTERNAL_PROTOCOL: &str = "$";

/// `protocol://rest`
static VIRTUAL_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_\-]+|\$)://(.*)$").expect("valid virtual path pattern")
});

static REMOTE_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(https?|ftp):").expect("valid url pattern"));

/// Placeholders substituted into mount destinations
const PLACEHOLDER_UID: &str = "%UID%";
const PLACEHOLDER_USERNAME: &str = "%USERNAME%";
const PLACEHOLDER_ROOT: &str = "%DROOT%";
const PLACEHOLDER_MOUNTPOINT: &str = "%MOUNTPOINT%";

/// A virtual path resolved against the mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub transport_name: String,
    /// Canonical `protocol://pathname` form
    pub query: String,
    pub protocol: String,
    /// Absolute backend path
    pub real: PathBuf,
    /// Normalized pathname, always starting with `/`
    pub path: String,
}

impl ResolvedPath {
    /// Virtual path of a child entry
    pub fn child(&self, name: &str) -> String {
        if self.path == "/" {
            format!("{}:///{}", self.protocol, name)
        } else {
            format!("{}://{}/{}", self.protocol, self.path, name)
        }
    }
}

/// Values available to placeholder substitution
#[derive(Debug, Clone, Default)]
pub struct PathArguments {
    pub uid: Option<String>,
    pub username: Option<String>,
    pub protocol: String,
}

/// Split `protocol://rest`; `None` when the string isn't a virtual path
pub fn split_virtual_path(query: &str) -> Option<(&str, &str)> {
    let caps = VIRTUAL_PATH_PATTERN.captures(query)?;
    let protocol = caps.get(1)?.as_str();
    let rest = caps.get(2)?.as_str();
    Some((protocol, rest))
}

/// `http(s)://` and `ftp://` locations bypass the mount table
pub fn is_remote_url(location: &str) -> bool {
    REMOTE_URL_PATTERN.is_match(location)
}

/// Normalize a pathname: collapse `.`, `..` and repeated slashes, force a
/// leading `/`. `..` never climbs above the root.
pub fn normalize_pathname(pathname: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in pathname.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Lexically normalize a real path (no filesystem access)
pub fn normalize_real(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !path.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolves virtual paths against the mount table
#[derive(Debug, Clone)]
pub struct Resolver {
    mounts: BTreeMap<String, MountConfig>,
    root_dir: PathBuf,
    mimes: MimeTable,
    strict_containment: bool,
}

impl Resolver {
    pub fn new(config: &Config) -> Self {
        Self {
            mounts: config.vfs.mounts.clone(),
            root_dir: config.root_dir.clone(),
            mimes: MimeTable::new(config.mimes.clone()),
            strict_containment: config.vfs.strict_containment,
        }
    }

    pub fn mount(&self, protocol: &str) -> Option<&MountConfig> {
        self.mounts.get(protocol)
    }

    pub fn mounts(&self) -> impl Iterator<Item = &MountConfig> {
        self.mounts.values()
    }

    pub fn mime(&self, filename: &str) -> &str {
        self.mimes.get(filename)
    }

    /// Parse a virtual path for the user bound to `ctx`
    pub fn parse_virtual_path(&self, query: &str, ctx: &RequestContext) -> Result<ResolvedPath> {
        let args = PathArguments {
            uid: ctx.session.user_id().map(|id| id.to_string()),
            username: ctx.username(),
            protocol: String::new(),
        };
        self.parse_with(query, args, ctx.internal)
    }

    /// Parse a virtual path with explicit placeholder values
    pub fn parse_with(
        &self,
        query: &str,
        mut args: PathArguments,
        internal: bool,
    ) -> Result<ResolvedPath> {
        let (protocol, rest) = split_virtual_path(query)
            .ok_or_else(|| WebdeskError::InvalidPath(format!("not a virtual path: {}", query)))?;
        let pathname = normalize_pathname(rest);

        let template = if protocol == INTERNAL_PROTOCOL {
            if !internal {
                return Err(WebdeskError::InvalidPath(format!(
                    "protocol {} is reserved",
                    INTERNAL_PROTOCOL
                )));
            }
            "/".to_string()
        } else {
            match self.mounts.get(protocol) {
                Some(mount) => mount.destination.clone(),
                None => {
                    return Err(WebdeskError::InvalidPath(format!(
                        "Failed to find real path for {}",
                        query
                    )))
                }
            }
        };

        args.protocol = protocol.to_string();
        let root = PathBuf::from(self.resolve_path_arguments(&template, &args));

        let relative = pathname.trim_start_matches('/');
        let real = if relative.is_empty() {
            root.clone()
        } else {
            root.join(relative)
        };

        if self.strict_containment {
            self.check_containment(&template, &args, &real, query)?;
        }

        let query = format!("{}://{}", protocol, pathname);
        trace!("resolved {} -> {:?}", query, real);

        Ok(ResolvedPath {
            transport_name: self.transport_name(Some(&query)),
            query,
            protocol: protocol.to_string(),
            real,
            path: pathname,
        })
    }

    /// Substitute placeholders into a destination template
    pub fn resolve_path_arguments(&self, template: &str, args: &PathArguments) -> String {
        let username = args.username.clone().unwrap_or_default();
        let uid = args.uid.clone().unwrap_or_else(|| username.clone());
        let root = self.root_dir.to_string_lossy();

        template
            .replace(PLACEHOLDER_UID, &uid)
            .replace(PLACEHOLDER_USERNAME, &username)
            .replace(PLACEHOLDER_ROOT, &root)
            .replace(PLACEHOLDER_MOUNTPOINT, &args.protocol)
    }

    /// The user-controlled placeholders must not move the path above the
    /// part of the template that precedes them.
    fn check_containment(
        &self,
        template: &str,
        args: &PathArguments,
        real: &Path,
        query: &str,
    ) -> Result<()> {
        let user_part = [PLACEHOLDER_UID, PLACEHOLDER_USERNAME]
            .iter()
            .filter_map(|p| template.find(p))
            .min();

        let fixed = match user_part {
            Some(idx) => {
                let prefix = &template[..idx];
                match prefix.rfind('/') {
                    Some(slash) => &prefix[..=slash],
                    None => "",
                }
            }
            None => template,
        };

        let base = normalize_real(Path::new(&self.resolve_path_arguments(fixed, args)));
        let real = normalize_real(real);

        if real.starts_with(&base) {
            Ok(())
        } else {
            warn!("{} escapes mount root {:?}", query, base);
            Err(WebdeskError::InvalidPath(format!(
                "{} resolves outside of its mount",
                query
            )))
        }
    }

    /// Name of the transport serving `location`
    pub fn transport_name(&self, location: Option<&str>) -> String {
        let Some(location) = location else {
            return DEFAULT_TRANSPORT.to_string();
        };

        if is_remote_url(location) {
            return HTTP_TRANSPORT.to_string();
        }

        let protocol = location.split(':').next().unwrap_or_default();
        self.mounts
            .get(protocol)
            .map(|m| m.transport.clone())
            .unwrap_or_else(|| DEFAULT_TRANSPORT.to_string())
    }
}
