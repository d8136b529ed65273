//! `/FS/*` handlers

use std::sync::Arc;

use bytes::Buf;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use warp::multipart::{FormData, Part};

use crate::auth::guard::FS_CAPABILITY;
use crate::auth::PermissionOptions;
use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::modules::AppContext;
use crate::response::ApiResponse;
use crate::server::router::ApiRequest;
use crate::transport::{VfsArgs, VfsData, VfsMethod};
use crate::vfs::respond;

/// `POST /FS/:method`
pub async fn request(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    let method: VfsMethod = match req.param("method").unwrap_or_default().parse() {
        Ok(method) => method,
        Err(e) => return ApiResponse::error(&e),
    };
    let args: VfsArgs = match req.data() {
        Ok(args) => args,
        Err(e) => return ApiResponse::error(&e),
    };

    call(&app, &req.ctx, method, args).await
}

/// `GET /FS/read?path=...&download=true`
pub async fn read(app: Arc<AppContext>, req: ApiRequest) -> ApiResponse {
    let path = req.data.get("path").and_then(Value::as_str).map(str::to_string);
    let download = req.data.get("download").and_then(Value::as_str) == Some("true");
    let args = VfsArgs {
        path,
        download,
        ..VfsArgs::default()
    };

    call(&app, &req.ctx, VfsMethod::Read, args).await
}

async fn call(app: &AppContext, ctx: &RequestContext, method: VfsMethod, args: VfsArgs) -> ApiResponse {
    let options = PermissionOptions::fs(
        args.location(),
        args.dest.as_deref(),
        method.permission_name(),
    );
    if let Err(e) = app.auth.check_permission(ctx, FS_CAPABILITY, &options).await {
        return ApiResponse::forbidden(&e);
    }

    let result = async {
        let data = app.vfs.request(ctx, method, args.clone()).await?;
        respond(ctx, method, &args, data).await
    }
    .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            debug!("fs {} failed: {}", method, e);
            ApiResponse::error(&e)
        }
    }
}

enum UploadError {
    Check(WebdeskError),
    Failed(WebdeskError),
}

impl From<WebdeskError> for UploadError {
    fn from(err: WebdeskError) -> Self {
        UploadError::Failed(err)
    }
}

/// `POST /FS/upload`
///
/// Form fields: `path` (target directory), optional `overwrite`, then one
/// or more `upload` files. `path` must come before the files.
pub async fn upload(app: Arc<AppContext>, ctx: RequestContext, form: FormData) -> ApiResponse {
    match receive_upload(&app, &ctx, form).await {
        Ok(files) => ApiResponse::result(json!(files)),
        Err(UploadError::Check(e)) => ApiResponse::forbidden(&e),
        Err(UploadError::Failed(e)) => ApiResponse::error(&e),
    }
}

async fn receive_upload(
    app: &AppContext,
    ctx: &RequestContext,
    mut form: FormData,
) -> std::result::Result<Vec<String>, UploadError> {
    let mut dest: Option<String> = None;
    let mut overwrite = false;
    let mut written = Vec::new();

    while let Some(part) = form.next().await {
        let part = part.map_err(|e| WebdeskError::InvalidArgument(e.to_string()))?;

        match part.name() {
            "path" => {
                let dir = read_text(part).await?;
                let options = PermissionOptions::fs(None, Some(&dir), "upload");
                app.auth
                    .check_permission(ctx, FS_CAPABILITY, &options)
                    .await
                    .map_err(UploadError::Check)?;
                dest = Some(dir);
            }
            "overwrite" => overwrite = read_text(part).await? == "true",
            "upload" => {
                let dir = dest.as_deref().ok_or_else(|| {
                    WebdeskError::InvalidArgument("path must precede upload".to_string())
                })?;
                let target = upload_target(dir, part.filename())?;

                if !overwrite {
                    let exists = app
                        .vfs
                        .request(ctx, VfsMethod::Exists, VfsArgs::with_path(target.clone()))
                        .await?;
                    if matches!(exists, VfsData::Json(Value::Bool(true))) {
                        return Err(WebdeskError::AlreadyExists(target).into());
                    }
                }

                let size = write_part(app, ctx, &target, part).await?;
                info!("uploaded {} ({} bytes)", target, size);
                written.push(target);
            }
            other => debug!("ignoring upload field {}", other),
        }
    }

    Ok(written)
}

/// Target virtual path for an uploaded file; only the basename is kept
fn upload_target(dir: &str, filename: Option<&str>) -> Result<String> {
    let name = filename
        .and_then(|f| f.rsplit(|c: char| c == '/' || c == '\\').next())
        .filter(|f| !f.is_empty() && *f != "." && *f != "..")
        .ok_or_else(|| WebdeskError::InvalidArgument("missing upload filename".to_string()))?;

    if dir.ends_with('/') {
        Ok(format!("{}{}", dir, name))
    } else {
        Ok(format!("{}/{}", dir, name))
    }
}

async fn write_part(app: &AppContext, ctx: &RequestContext, target: &str, part: Part) -> Result<u64> {
    let mut sink = app.vfs.create_write_stream(ctx, target).await?;
    let mut stream = Box::pin(part_chunks(part));
    let mut size = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        sink.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    sink.shutdown().await?;
    Ok(size)
}

fn part_chunks(part: Part) -> impl Stream<Item = Result<Vec<u8>>> {
    part.stream().map(|buf| {
        buf.map(|mut buf| {
            let mut chunk = Vec::with_capacity(buf.remaining());
            while buf.has_remaining() {
                let n = buf.chunk().len();
                chunk.extend_from_slice(buf.chunk());
                buf.advance(n);
            }
            chunk
        })
        .map_err(|e| WebdeskError::InvalidArgument(e.to_string()))
    })
}

async fn read_text(part: Part) -> Result<String> {
    let mut stream = Box::pin(part_chunks(part));
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&data).trim().to_string())
}
