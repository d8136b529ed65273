//! Virtual filesystem dispatcher
//!
//! `Vfs` routes each call to the transport serving its location. Path
//! parsing lives in [`path`], response shaping in [`respond`].

pub mod mime;
pub mod path;
pub mod respond;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Map;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::transport::{
    ByteRange, ByteSink, ByteStream, Transport, TransportRegistry, VfsArgs, VfsData, VfsMethod,
    WatchSink,
};

pub use mime::{data_url, permission_to_string, MimeTable};
pub use path::{is_remote_url, normalize_pathname, ResolvedPath, Resolver};
pub use respond::{parse_range, respond};

pub struct Vfs {
    resolver: Arc<Resolver>,
    transports: TransportRegistry,
}

impl Vfs {
    pub fn new(resolver: Arc<Resolver>, transports: TransportRegistry) -> Self {
        Self {
            resolver,
            transports,
        }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub fn transports(&self) -> &TransportRegistry {
        &self.transports
    }

    pub fn parse_virtual_path(&self, query: &str, ctx: &RequestContext) -> Result<ResolvedPath> {
        self.resolver.parse_virtual_path(query, ctx)
    }

    fn transport_for(&self, location: Option<&str>) -> Result<Arc<dyn Transport>> {
        let name = self.resolver.transport_name(location);
        self.transports
            .get(&name)
            .ok_or(WebdeskError::NoSuchTransport(name))
    }

    /// Dispatch a VFS call to the transport serving `args.location()`
    pub async fn request(
        &self,
        ctx: &RequestContext,
        method: VfsMethod,
        mut args: VfsArgs,
    ) -> Result<VfsData> {
        args.options.get_or_insert_with(Map::new);

        let transport = self.transport_for(args.location())?;
        debug!(
            "vfs {} {:?} via {}",
            method,
            args.location(),
            transport.name()
        );

        transport
            .request(&self.resolver, ctx, method, &args)
            .await
    }

    /// Server-side call on behalf of `username`; `$://` paths are allowed
    pub async fn raw_request(
        &self,
        method: VfsMethod,
        args: VfsArgs,
        username: Option<&str>,
    ) -> Result<VfsData> {
        let ctx = RequestContext::internal(username);
        self.request(&ctx, method, args).await
    }

    fn stream_target(
        &self,
        ctx: &RequestContext,
        vpath: &str,
    ) -> Result<(Arc<dyn Transport>, PathBuf)> {
        let transport = self.transport_for(Some(vpath))?;
        let real = if is_remote_url(vpath) {
            PathBuf::from(vpath)
        } else {
            self.resolver.parse_virtual_path(vpath, ctx)?.real
        };
        Ok((transport, real))
    }

    pub async fn create_read_stream(
        &self,
        ctx: &RequestContext,
        vpath: &str,
        range: Option<ByteRange>,
    ) -> Result<ByteStream> {
        let (transport, real) = self.stream_target(ctx, vpath)?;
        transport.create_read_stream(&real, range).await
    }

    pub async fn create_write_stream(&self, ctx: &RequestContext, vpath: &str) -> Result<ByteSink> {
        let (transport, real) = self.stream_target(ctx, vpath)?;
        transport.create_write_stream(&real).await
    }

    /// Ask every enabled mount's transport to start watching.
    ///
    /// Returns the protocols that are being watched.
    pub fn watch(&self, sink: WatchSink) -> Vec<String> {
        let mut watching = Vec::new();

        for mount in self.resolver.mounts().filter(|m| m.enabled) {
            let Some(transport) = self.transports.get(&mount.transport) else {
                warn!(
                    "Mount {} uses unknown transport {}",
                    mount.protocol, mount.transport
                );
                continue;
            };

            match transport.create_watch(mount, sink.clone()) {
                Ok(true) => {
                    info!("Watching mount {}", mount.protocol);
                    watching.push(mount.protocol.clone());
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to watch mount {}: {}", mount.protocol, e),
            }
        }

        watching
    }
}
