//! Route table shared by HTTP and WebSocket ingress

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::Result;
use crate::modules::AppContext;
use crate::response::ApiResponse;

pub type HandlerFuture = BoxFuture<'static, ApiResponse>;

type Handler = Arc<dyn Fn(Arc<AppContext>, ApiRequest) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMethod {
    Get,
    Post,
}

/// A request after ingress normalization
#[derive(Debug)]
pub struct ApiRequest {
    pub params: HashMap<String, String>,
    /// JSON body (POST), query parameters (GET) or WebSocket `args`
    pub data: Value,
    pub ctx: RequestContext,
}

impl ApiRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Deserialize the request data
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    method: RouteMethod,
    segments: Vec<Segment>,
    handler: Handler,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    split_path(pattern)
        .map(|s| match s.strip_prefix(':') {
            Some(name) => Segment::Param(name.to_string()),
            None => Segment::Literal(s.to_string()),
        })
        .collect()
}

impl Route {
    fn matches(&self, method: RouteMethod, path: &str) -> Option<HashMap<String, String>> {
        if method != self.method {
            return None;
        }

        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `pattern`; `:name` segments become params
    pub fn route<F, Fut>(mut self, method: RouteMethod, pattern: &str, handler: F) -> Self
    where
        F: Fn(Arc<AppContext>, ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            segments: parse_pattern(pattern),
            handler: Arc::new(move |app: Arc<AppContext>, req: ApiRequest| handler(app, req).boxed()),
        });
        self
    }

    pub fn get<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Arc<AppContext>, ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        self.route(RouteMethod::Get, pattern, handler)
    }

    pub fn post<F, Fut>(self, pattern: &str, handler: F) -> Self
    where
        F: Fn(Arc<AppContext>, ApiRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        self.route(RouteMethod::Post, pattern, handler)
    }

    /// Start the first matching handler; `None` when nothing matches
    pub fn dispatch(
        &self,
        app: Arc<AppContext>,
        method: RouteMethod,
        path: &str,
        data: Value,
        ctx: RequestContext,
    ) -> Option<HandlerFuture> {
        self.routes.iter().find_map(|route| {
            let params = route.matches(method, path)?;
            let request = ApiRequest { params, data: data.clone(), ctx: ctx.clone() };
            Some((route.handler)(app.clone(), request))
        })
    }
}
