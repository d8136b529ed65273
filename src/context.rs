//! Uniform request context shared by HTTP and WebSocket ingress

use warp::http::header::RANGE;
use warp::http::HeaderMap;

use crate::session::Session;

/// Normalized view of an inbound request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session: Session,
    pub headers: HeaderMap,
    /// Server-side request; enables the `$` protocol
    pub internal: bool,
}

impl RequestContext {
    pub fn new(session: Session, headers: HeaderMap) -> Self {
        Self {
            session,
            headers,
            internal: false,
        }
    }

    /// Context for a server-side request acting as `username`
    pub fn internal(username: Option<&str>) -> Self {
        Self {
            session: Session::detached(username),
            headers: HeaderMap::new(),
            internal: true,
        }
    }

    pub fn username(&self) -> Option<String> {
        self.session.username()
    }

    /// Raw `Range` header, if any
    pub fn range_header(&self) -> Option<&str> {
        self.headers.get(RANGE).and_then(|v| v.to_str().ok())
    }
}
