//! Transport-neutral responses produced by route handlers
//!
//! HTTP ingress turns these into warp replies; WebSocket ingress folds them
//! into a JSON frame.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::{json, Value};
use warp::http::header::CONTENT_TYPE;

use crate::error::WebdeskError;
use crate::transport::ByteStream;
use crate::vfs::mime::data_url;

pub enum ResponseBody {
    Json(Value),
    Bytes(Bytes),
    Stream(ByteStream),
    Empty,
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Json(v) => write!(f, "Json({})", v),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Stream(_) => f.write_str("Stream"),
            ResponseBody::Empty => f.write_str("Empty"),
        }
    }
}

#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    /// `{result: value}` with status 200
    pub fn result(value: Value) -> Self {
        Self::new(200, ResponseBody::Json(json!({ "result": value })))
    }

    /// `{error: message}` with the error's own status
    pub fn error(err: &WebdeskError) -> Self {
        Self::new(
            err.status_code(),
            ResponseBody::Json(json!({ "error": err.to_string() })),
        )
    }

    /// `{error: message}` with status 200
    pub fn error_message(message: impl Into<String>) -> Self {
        Self::new(200, ResponseBody::Json(json!({ "error": message.into() })))
    }

    /// `{error: message}` with status 403, for failed checks
    pub fn forbidden(err: &WebdeskError) -> Self {
        Self::new(403, ResponseBody::Json(json!({ "error": err.to_string() })))
    }

    pub fn bytes(mime: &str, data: Bytes) -> Self {
        Self::new(200, ResponseBody::Bytes(data)).with_header(CONTENT_TYPE.as_str(), mime)
    }

    pub fn stream(status: u16, stream: ByteStream) -> Self {
        Self::new(status, ResponseBody::Stream(stream))
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Collapse into a single JSON value; binary bodies become a data URL
    /// in `result`.
    pub async fn into_json(self) -> Value {
        let mime = self
            .header(CONTENT_TYPE.as_str())
            .unwrap_or("application/octet-stream")
            .to_string();

        match self.body {
            ResponseBody::Json(value) => value,
            ResponseBody::Bytes(data) => json!({ "result": data_url(&mime, &data) }),
            ResponseBody::Stream(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    match chunk {
                        Ok(chunk) => buf.extend_from_slice(&chunk),
                        Err(e) => return json!({ "error": e.to_string() }),
                    }
                }
                json!({ "result": data_url(&mime, &buf) })
            }
            ResponseBody::Empty if self.status >= 400 => {
                json!({ "error": format!("Request failed with status {}", self.status) })
            }
            ResponseBody::Empty => json!({ "result": null }),
        }
    }
}
