//! Read-only transport for remote `http(s)://` URLs

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response};
use serde_json::json;
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::transport::{
    ByteRange, ByteSink, ByteStream, FileContent, FileData, Resource, Transport, VfsArgs,
    VfsData, VfsMethod, HTTP_TRANSPORT,
};
use crate::vfs::mime::data_url;
use crate::vfs::Resolver;

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn read(&self, resolver: &Resolver, args: &VfsArgs) -> Result<VfsData> {
        let url = args.require_path()?.to_string();
        let filename = url_filename(&url);

        if !args.raw() {
            let response = fetch(&self.client, &url, None).await?;
            let mime = content_type(&response).unwrap_or_else(|| resolver.mime(&filename).to_string());
            let body = response.bytes().await.map_err(transport_error)?;
            return Ok(VfsData::json(data_url(&mime, &body)));
        }

        if !args.stream() {
            let response = fetch(&self.client, &url, None).await?;
            let mime = content_type(&response).unwrap_or_else(|| resolver.mime(&filename).to_string());
            let body = response.bytes().await.map_err(transport_error)?;
            return Ok(VfsData::File(FileData {
                filename,
                mime,
                size: body.len() as u64,
                raw: true,
                content: FileContent::Bytes(body),
            }));
        }

        let head = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(transport_error)?;
        let size = head
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let mime = content_type(&head).unwrap_or_else(|| resolver.mime(&filename).to_string());
        debug!("remote {} is {} bytes of {}", url, size, mime);

        Ok(VfsData::File(FileData {
            filename,
            mime,
            size,
            raw: true,
            content: FileContent::Stream(Arc::new(RemoteFile {
                client: self.client.clone(),
                url,
            })),
        }))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        HTTP_TRANSPORT
    }

    async fn request(
        &self,
        resolver: &Resolver,
        _ctx: &RequestContext,
        method: VfsMethod,
        args: &VfsArgs,
    ) -> Result<VfsData> {
        match method {
            VfsMethod::Read | VfsMethod::Download => self.read(resolver, args).await,
            VfsMethod::Exists => {
                let url = args.require_path()?;
                let ok = matches!(
                    self.client.head(url).send().await,
                    Ok(resp) if resp.status().is_success()
                );
                Ok(VfsData::json(json!(ok)))
            }
            other => Err(WebdeskError::NoSuchMethod(format!(
                "{} is not available for remote URLs",
                other
            ))),
        }
    }

    async fn create_read_stream(&self, real: &Path, range: Option<ByteRange>) -> Result<ByteStream> {
        let url = real.to_string_lossy();
        let response = fetch(&self.client, &url, range).await?;
        Ok(body_stream(response))
    }

    async fn create_write_stream(&self, _real: &Path) -> Result<ByteSink> {
        Err(WebdeskError::NotSupported("Unavailable".to_string()))
    }
}

/// Remote body fetched on open
struct RemoteFile {
    client: Client,
    url: String,
}

#[async_trait]
impl Resource for RemoteFile {
    async fn open(&self, range: Option<ByteRange>) -> Result<ByteStream> {
        let response = fetch(&self.client, &self.url, range).await?;
        Ok(body_stream(response))
    }
}

async fn fetch(client: &Client, url: &str, range: Option<ByteRange>) -> Result<Response> {
    let mut request = client.get(url);
    if let Some(range) = range {
        request = request.header(RANGE, format!("bytes={}-{}", range.start, range.end));
    }

    let response = request.send().await.map_err(transport_error)?;
    if !response.status().is_success() {
        return Err(WebdeskError::Transport(format!(
            "Failed to fetch {}: {}",
            url,
            response.status()
        )));
    }
    Ok(response)
}

fn body_stream(response: Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(|chunk: reqwest::Result<Bytes>| chunk.map_err(transport_error)),
    )
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
}

fn transport_error(err: reqwest::Error) -> WebdeskError {
    WebdeskError::Transport(err.to_string())
}

/// Last path segment of a URL, ignoring query and fragment
fn url_filename(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "download".to_string())
}
