//! Local filesystem transport
//!
//! Serves every mount that doesn't name a transport. All I/O goes through
//! `tokio::fs`; file content is streamed in fixed-size chunks.

use std::io::SeekFrom;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde_json::{json, Value};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, trace};

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::transport::{
    ByteRange, ByteSink, ByteStream, FileContent, FileData, Resource, Transport, VfsArgs,
    VfsData, VfsMethod, DEFAULT_TRANSPORT,
};
use crate::vfs::mime::{decode_data_url, permission_to_string};
use crate::vfs::{ResolvedPath, Resolver};

/// Read chunk size
const CHUNK_SIZE: usize = 64 * 1024;

/// Default cap on `find` results
const DEFAULT_FIND_LIMIT: usize = 1000;

#[derive(Debug, Default)]
pub struct LocalTransport;

impl LocalTransport {
    pub fn new() -> Self {
        Self
    }

    fn resolve(&self, resolver: &Resolver, ctx: &RequestContext, query: &str) -> Result<ResolvedPath> {
        let resolved = resolver.parse_virtual_path(query, ctx)?;
        if resolved.transport_name != DEFAULT_TRANSPORT {
            return Err(WebdeskError::NotSupported(format!(
                "{} is served by {}",
                query, resolved.transport_name
            )));
        }
        Ok(resolved)
    }

    async fn scandir(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let show_hidden = args.option_bool("showHiddenFiles").unwrap_or(true);

        let mut reader = fs::read_dir(&resolved.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !show_hidden && name.starts_with('.') {
                continue;
            }
            // entries can vanish between listing and stat
            let Ok(meta) = fs::metadata(entry.path()).await else {
                trace!("skipping unreadable entry {:?}", entry.path());
                continue;
            };
            entries.push(file_entry(resolver, &resolved.child(&name), &name, &meta));
        }

        sort_entries(&mut entries);
        Ok(Value::Array(entries))
    }

    async fn find(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let root = self.resolve(resolver, ctx, args.require_path()?)?;
        let query = args
            .option_str("query")
            .ok_or_else(|| WebdeskError::InvalidArgument("missing search query".to_string()))?
            .to_lowercase();
        let limit = args
            .option("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_FIND_LIMIT);
        let recursive = args.option_bool("recursive").unwrap_or(true);

        let mut results = Vec::new();
        let mut pending: Vec<(PathBuf, String)> = vec![(root.real.clone(), root.path.clone())];

        'walk: while let Some((dir, vdir)) = pending.pop() {
            let mut reader = match fs::read_dir(&dir).await {
                Ok(reader) => reader,
                Err(e) => {
                    debug!("find: cannot read {:?}: {}", dir, e);
                    continue;
                }
            };

            while let Some(entry) = reader.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let Ok(meta) = fs::metadata(entry.path()).await else {
                    continue;
                };
                let vpath = if vdir == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", vdir, name)
                };

                if name.to_lowercase().contains(&query) {
                    let virtual_path = format!("{}://{}", root.protocol, vpath);
                    results.push(file_entry(resolver, &virtual_path, &name, &meta));
                    if results.len() >= limit {
                        break 'walk;
                    }
                }

                if recursive && meta.is_dir() {
                    pending.push((entry.path(), vpath));
                }
            }
        }

        sort_entries(&mut results);
        Ok(Value::Array(results))
    }

    async fn read(
        &self,
        resolver: &Resolver,
        ctx: &RequestContext,
        args: &VfsArgs,
        force_stream: bool,
    ) -> Result<FileData> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let meta = fs::metadata(&resolved.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;
        if meta.is_dir() {
            return Err(WebdeskError::InvalidArgument(format!(
                "{} is a directory",
                resolved.query
            )));
        }

        let filename = basename(&resolved.path);
        let mime = resolver.mime(&filename).to_string();
        let raw = args.raw();

        let content = if force_stream || (raw && args.stream()) {
            FileContent::Stream(Arc::new(LocalFile {
                path: resolved.real.clone(),
            }))
        } else {
            let data = fs::read(&resolved.real)
                .await
                .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;
            FileContent::Bytes(Bytes::from(data))
        };

        Ok(FileData {
            filename,
            mime,
            size: meta.len(),
            raw: raw || force_stream,
            content,
        })
    }

    async fn write(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let data = match args.extra.get("data") {
            Some(Value::String(s)) if s.starts_with("data:") => decode_data_url(s)?.1,
            Some(Value::String(s)) => s.clone().into_bytes(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => other.to_string().into_bytes(),
        };

        debug!("write {} ({} bytes)", resolved.query, data.len());
        fs::write(&resolved.real, &data)
            .await
            .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;
        Ok(json!(data.len()))
    }

    async fn copy(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let (src, dest) = args.require_src_dest()?;
        let src = self.resolve(resolver, ctx, src)?;
        let dest = self.resolve(resolver, ctx, dest)?;
        ensure_absent(&dest).await?;

        let meta = fs::metadata(&src.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &src.query))?;
        if !meta.is_dir() {
            fs::copy(&src.real, &dest.real)
                .await
                .map_err(|e| WebdeskError::from_io(e, &dest.query))?;
            return Ok(json!(true));
        }

        if dest.real.starts_with(&src.real) {
            return Err(WebdeskError::InvalidArgument(format!(
                "cannot copy {} into itself",
                src.query
            )));
        }

        let mut pending = vec![(src.real.clone(), dest.real.clone())];
        while let Some((from, to)) = pending.pop() {
            fs::create_dir(&to)
                .await
                .map_err(|e| WebdeskError::from_io(e, &to))?;
            let mut reader = fs::read_dir(&from).await?;
            while let Some(entry) = reader.next_entry().await? {
                let target = to.join(entry.file_name());
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    fs::copy(entry.path(), &target).await?;
                }
            }
        }

        Ok(json!(true))
    }

    async fn rename(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let (src, dest) = args.require_src_dest()?;
        let src = self.resolve(resolver, ctx, src)?;
        let dest = self.resolve(resolver, ctx, dest)?;
        ensure_absent(&dest).await?;

        fs::rename(&src.real, &dest.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &src.query))?;
        Ok(json!(true))
    }

    async fn unlink(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        if resolved.path == "/" {
            return Err(WebdeskError::InvalidArgument(format!(
                "refusing to remove mount root {}",
                resolved.query
            )));
        }

        let meta = fs::symlink_metadata(&resolved.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;
        let removed = if meta.is_dir() {
            fs::remove_dir_all(&resolved.real).await
        } else {
            fs::remove_file(&resolved.real).await
        };
        removed.map_err(|e| WebdeskError::from_io(e, &resolved.query))?;

        Ok(json!(true))
    }

    async fn mkdir(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        ensure_absent(&resolved).await?;

        let created = if args.option_bool("recursive").unwrap_or(false) {
            fs::create_dir_all(&resolved.real).await
        } else {
            fs::create_dir(&resolved.real).await
        };
        created.map_err(|e| WebdeskError::from_io(e, &resolved.query))?;

        Ok(json!(true))
    }

    async fn exists(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        Ok(json!(fs::try_exists(&resolved.real).await?))
    }

    async fn fileinfo(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let meta = fs::metadata(&resolved.real)
            .await
            .map_err(|e| WebdeskError::from_io(e, &resolved.query))?;
        Ok(file_entry(
            resolver,
            &resolved.query,
            &basename(&resolved.path),
            &meta,
        ))
    }

    fn url(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let mut url = reqwest::Url::parse("http://localhost/FS/read")
            .map_err(|e| WebdeskError::Transport(e.to_string()))?;
        url.query_pairs_mut().append_pair("path", &resolved.query);
        Ok(json!(format!(
            "{}?{}",
            url.path(),
            url.query().unwrap_or_default()
        )))
    }

    async fn free_space(&self, resolver: &Resolver, ctx: &RequestContext, args: &VfsArgs) -> Result<Value> {
        let resolved = self.resolve(resolver, ctx, args.require_path()?)?;
        let real = resolved.real.clone();
        let free = tokio::task::spawn_blocking(move || statvfs_free(&real))
            .await
            .map_err(|e| WebdeskError::Transport(e.to_string()))??;
        Ok(json!(free))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        DEFAULT_TRANSPORT
    }

    async fn request(
        &self,
        resolver: &Resolver,
        ctx: &RequestContext,
        method: VfsMethod,
        args: &VfsArgs,
    ) -> Result<VfsData> {
        let value = match method {
            VfsMethod::Scandir => self.scandir(resolver, ctx, args).await?,
            VfsMethod::Find => self.find(resolver, ctx, args).await?,
            VfsMethod::Read => return Ok(VfsData::File(self.read(resolver, ctx, args, false).await?)),
            VfsMethod::Download => {
                return Ok(VfsData::File(self.read(resolver, ctx, args, true).await?))
            }
            VfsMethod::Write => self.write(resolver, ctx, args).await?,
            VfsMethod::Copy => self.copy(resolver, ctx, args).await?,
            VfsMethod::Move => self.rename(resolver, ctx, args).await?,
            VfsMethod::Unlink => self.unlink(resolver, ctx, args).await?,
            VfsMethod::Mkdir => self.mkdir(resolver, ctx, args).await?,
            VfsMethod::Exists => self.exists(resolver, ctx, args).await?,
            VfsMethod::Fileinfo => self.fileinfo(resolver, ctx, args).await?,
            VfsMethod::Url => self.url(resolver, ctx, args)?,
            VfsMethod::FreeSpace => self.free_space(resolver, ctx, args).await?,
            VfsMethod::Trash
            | VfsMethod::Untrash
            | VfsMethod::EmptyTrash
            | VfsMethod::Watch
            | VfsMethod::Unwatch => {
                return Err(WebdeskError::NotSupported(method.to_string()));
            }
        };
        Ok(VfsData::Json(value))
    }

    async fn create_read_stream(&self, real: &Path, range: Option<ByteRange>) -> Result<ByteStream> {
        open_file_stream(real, range).await
    }

    async fn create_write_stream(&self, real: &Path) -> Result<ByteSink> {
        let file = File::create(real)
            .await
            .map_err(|e| WebdeskError::from_io(e, real))?;
        Ok(Box::pin(file))
    }
}

/// Lazily opened local file
struct LocalFile {
    path: PathBuf,
}

#[async_trait]
impl Resource for LocalFile {
    async fn open(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        open_file_stream(&self.path, range).await
    }
}

async fn open_file_stream(path: &Path, range: Option<ByteRange>) -> Result<ByteStream> {
    let mut file = File::open(path)
        .await
        .map_err(|e| WebdeskError::from_io(e, path))?;

    let (start, remaining) = match range {
        Some(r) => (r.start, Some(r.length())),
        None => (0, None),
    };
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    Ok(Box::pin(read_chunks(file, remaining)))
}

/// Stream `remaining` bytes (or everything) from the current position
fn read_chunks(mut file: File, mut remaining: Option<u64>) -> impl Stream<Item = Result<Bytes>> {
    try_stream! {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let want = match remaining {
                Some(0) => break,
                Some(n) => n.min(CHUNK_SIZE as u64) as usize,
                None => CHUNK_SIZE,
            };

            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            if let Some(left) = remaining.as_mut() {
                *left -= n as u64;
            }

            trace!("read chunk of {} bytes", n);
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    }
}

async fn ensure_absent(resolved: &ResolvedPath) -> Result<()> {
    if fs::try_exists(&resolved.real).await? {
        return Err(WebdeskError::AlreadyExists(resolved.query.clone()));
    }
    Ok(())
}

fn basename(pathname: &str) -> String {
    pathname.rsplit('/').next().unwrap_or_default().to_string()
}

fn rfc3339(time: std::io::Result<SystemTime>) -> Value {
    match time {
        Ok(t) => Value::String(DateTime::<Utc>::from(t).to_rfc3339()),
        Err(_) => Value::Null,
    }
}

fn file_entry(resolver: &Resolver, vpath: &str, filename: &str, meta: &std::fs::Metadata) -> Value {
    let is_dir = meta.is_dir();
    json!({
        "filename": filename,
        "path": vpath,
        "isDirectory": is_dir,
        "isFile": meta.is_file(),
        "type": if is_dir { "dir" } else { "file" },
        "size": if is_dir { 0 } else { meta.len() },
        "mime": if is_dir { Value::Null } else { Value::String(resolver.mime(filename).to_string()) },
        "mtime": rfc3339(meta.modified()),
        "ctime": rfc3339(meta.created()),
        "mode": permission_to_string(meta.mode()),
    })
}

/// Directories first, then by name
fn sort_entries(entries: &mut [Value]) {
    entries.sort_by(|a, b| {
        let dir = |v: &Value| v["isDirectory"].as_bool().unwrap_or(false);
        let name = |v: &Value| v["filename"].as_str().unwrap_or_default().to_lowercase();
        dir(b).cmp(&dir(a)).then_with(|| name(a).cmp(&name(b)))
    });
}

fn statvfs_free(path: &Path) -> Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| WebdeskError::InvalidPath(path.display().to_string()))?;

    // SAFETY: statvfs only writes into the zeroed struct we own
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(WebdeskError::from_io(std::io::Error::last_os_error(), path));
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}
