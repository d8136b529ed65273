pub mod http;
pub mod local;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWrite;
use tracing::{info, warn};

use crate::config::MountConfig;
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::vfs::Resolver;

pub use http::HttpTransport;
pub use local::LocalTransport;

/// Transport used by mounts that don't name one
pub const DEFAULT_TRANSPORT: &str = "__default__";

/// Transport handling `http(s)://` and `ftp://` locations
pub const HTTP_TRANSPORT: &str = "HTTP";

/// VFS methods callable through the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VfsMethod {
    Find,
    Scandir,
    Write,
    Read,
    Copy,
    Move,
    Unlink,
    Mkdir,
    Exists,
    Fileinfo,
    Url,
    Download,
    Trash,
    Untrash,
    EmptyTrash,
    FreeSpace,
    Watch,
    Unwatch,
}

impl VfsMethod {
    pub const ALL: [VfsMethod; 18] = [
        VfsMethod::Find,
        VfsMethod::Scandir,
        VfsMethod::Write,
        VfsMethod::Read,
        VfsMethod::Copy,
        VfsMethod::Move,
        VfsMethod::Unlink,
        VfsMethod::Mkdir,
        VfsMethod::Exists,
        VfsMethod::Fileinfo,
        VfsMethod::Url,
        VfsMethod::Download,
        VfsMethod::Trash,
        VfsMethod::Untrash,
        VfsMethod::EmptyTrash,
        VfsMethod::FreeSpace,
        VfsMethod::Watch,
        VfsMethod::Unwatch,
    ];

    /// Wire name of the method
    pub fn as_str(&self) -> &'static str {
        match self {
            VfsMethod::Find => "find",
            VfsMethod::Scandir => "scandir",
            VfsMethod::Write => "write",
            VfsMethod::Read => "read",
            VfsMethod::Copy => "copy",
            VfsMethod::Move => "move",
            VfsMethod::Unlink => "unlink",
            VfsMethod::Mkdir => "mkdir",
            VfsMethod::Exists => "exists",
            VfsMethod::Fileinfo => "fileinfo",
            VfsMethod::Url => "url",
            VfsMethod::Download => "download",
            VfsMethod::Trash => "trash",
            VfsMethod::Untrash => "untrash",
            VfsMethod::EmptyTrash => "emptyTrash",
            VfsMethod::FreeSpace => "freeSpace",
            VfsMethod::Watch => "watch",
            VfsMethod::Unwatch => "unwatch",
        }
    }

    /// Name used by filesystem permission checks (`unlink` is a `delete`)
    pub fn permission_name(&self) -> &'static str {
        match self {
            VfsMethod::Unlink => "delete",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for VfsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VfsMethod {
    type Err = WebdeskError;

    fn from_str(s: &str) -> Result<Self> {
        VfsMethod::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| WebdeskError::NoSuchMethod(s.to_string()))
    }
}

/// Arguments of a VFS call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VfsArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    /// Send `read` results as an attachment, ignoring `Range`
    #[serde(default)]
    pub download: bool,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
    /// Method-specific fields (e.g. `data` for `write`)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VfsArgs {
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_src_dest(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            dest: Some(dest.into()),
            ..Self::default()
        }
    }

    /// The location that selects the transport
    pub fn location(&self) -> Option<&str> {
        self.path
            .as_deref()
            .or(self.root.as_deref())
            .or(self.src.as_deref())
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.as_ref().and_then(|o| o.get(key))
    }

    pub fn option_bool(&self, key: &str) -> Option<bool> {
        self.option(key).and_then(Value::as_bool)
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }

    /// `options.raw`; defaults to raw bytes
    pub fn raw(&self) -> bool {
        self.option_bool("raw").unwrap_or(true)
    }

    /// `options.stream`; defaults to streaming
    pub fn stream(&self) -> bool {
        self.option_bool("stream").unwrap_or(true)
    }

    pub fn require_path(&self) -> Result<&str> {
        self.path
            .as_deref()
            .ok_or_else(|| WebdeskError::InvalidArgument("missing path".to_string()))
    }

    pub fn require_src_dest(&self) -> Result<(&str, &str)> {
        match (self.src.as_deref(), self.dest.as_deref()) {
            (Some(src), Some(dest)) => Ok((src, dest)),
            _ => Err(WebdeskError::InvalidArgument(
                "missing src or dest".to_string(),
            )),
        }
    }
}

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered (ranges are never empty)
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Stream of file content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Destination of an upload
pub type ByteSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Lazy factory for file content
///
/// Nothing is read until the response layer opens the resource, so the
/// range can be decided after the metadata is known.
#[async_trait]
pub trait Resource: Send + Sync {
    async fn open(&self, range: Option<ByteRange>) -> Result<ByteStream>;
}

/// Content of a `read` result
#[derive(Clone)]
pub enum FileContent {
    Bytes(Bytes),
    Stream(Arc<dyn Resource>),
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContent::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            FileContent::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// File returned by `read`/`download`
#[derive(Debug, Clone)]
pub struct FileData {
    pub filename: String,
    pub mime: String,
    pub size: u64,
    /// `false` when the caller asked for a data URL
    pub raw: bool,
    pub content: FileContent,
}

/// Result of a transport request
#[derive(Debug, Clone)]
pub enum VfsData {
    Json(Value),
    File(FileData),
}

impl VfsData {
    pub fn json(value: impl Into<Value>) -> Self {
        VfsData::Json(value.into())
    }
}

/// Change notification from a watching transport
#[derive(Debug, Clone, Serialize)]
pub struct WatchEvent {
    pub mount: String,
    pub path: String,
    pub event: String,
}

/// Receiver of watch notifications
pub type WatchSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Core transport trait for storage backends
///
/// Transports receive virtual paths in `request` and resolve them through
/// the `Resolver`; the stream methods get real locations only.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Execute a VFS method
    async fn request(
        &self,
        resolver: &Resolver,
        ctx: &RequestContext,
        method: VfsMethod,
        args: &VfsArgs,
    ) -> Result<VfsData>;

    /// Open a real location for reading
    async fn create_read_stream(&self, real: &Path, range: Option<ByteRange>)
        -> Result<ByteStream>;

    /// Open a real location for writing (truncating)
    async fn create_write_stream(&self, real: &Path) -> Result<ByteSink>;

    /// Start watching a mount
    ///
    /// Default implementation doesn't watch and returns `false`
    fn create_watch(&self, _mount: &MountConfig, _sink: WatchSink) -> Result<bool> {
        Ok(false)
    }
}

/// Name to transport table, filled at startup and read-only afterwards
#[derive(Default, Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the local and HTTP transports
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LocalTransport::new()));
        registry.register(Arc::new(HttpTransport::new()));
        registry
    }

    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        let name = transport.name().to_string();
        info!("Registering transport {}", name);
        if self.transports.insert(name.clone(), transport).is_some() {
            warn!("Transport {} registered twice, keeping the last one", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transports.keys().cloned().collect();
        names.sort();
        names
    }
}
