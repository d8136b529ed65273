//! HTTP and WebSocket front end
//!
//! Both ingress paths build a [`RequestContext`] and dispatch through the
//! same [`Router`]. Uploads, package assets and static files are plain warp
//! filters around it.

pub mod api;
pub mod connections;
pub mod fs;
pub mod router;
pub mod ws;

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::Future;
use percent_encoding::percent_decode_str;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use warp::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE};
use warp::http::{HeaderMap, StatusCode};
use warp::hyper::Body;
use warp::path::{FullPath, Peek};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

pub use connections::Connections;
pub use router::{ApiRequest, RouteMethod, Router};

use crate::context::RequestContext;
use crate::error::{Result, WebdeskError};
use crate::modules::AppContext;
use crate::response::{ApiResponse, ResponseBody};

/// The route table shared by HTTP and WebSocket ingress
pub fn routes() -> Router {
    Router::new()
        .post("/API/login", api::login)
        .post("/API/logout", api::logout)
        .post("/API/packages", api::packages)
        .post("/API/application", api::application)
        .post("/API/settings", api::settings)
        .post("/API/users", api::users)
        .get("/FS/read", fs::read)
        .post("/FS/:method", fs::request)
}

/// Rejection for a failed package permission check
#[derive(Debug)]
struct Forbidden(String);

impl warp::reject::Reject for Forbidden {}

/// Request context plus whether its session was created for this request
struct Ingress {
    ctx: RequestContext,
    created: bool,
}

fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

fn session_id<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| find_cookie(header, name))
}

fn ingress(app: Arc<AppContext>) -> impl Filter<Extract = (Ingress,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(move |headers: HeaderMap| {
        let (session, created) = app
            .sessions
            .get_or_create(session_id(&headers, &app.config.http.session.name));
        Ingress {
            ctx: RequestContext::new(session, headers),
            created,
        }
    })
}

fn with_app(app: Arc<AppContext>) -> impl Filter<Extract = (Arc<AppContext>,), Error = Infallible> + Clone {
    warp::any().map(move || app.clone())
}

fn with_router(
    router: Arc<Router>,
) -> impl Filter<Extract = (Arc<Router>,), Error = Infallible> + Clone {
    warp::any().map(move || router.clone())
}

/// Passes only when `enabled`
fn gate(enabled: bool) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::any()
        .and_then(move || async move {
            if enabled {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
}

/// Matches the whole request path against `path`
fn exact_path(path: String) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    let path = Arc::new(path);
    warp::path::full()
        .and_then(move |full: FullPath| {
            let path = path.clone();
            async move {
                if full.as_str().trim_end_matches('/') == path.as_str() {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
}

/// Whether `path` is inside the packages tree once decoded
fn is_packages_path(path: &str) -> bool {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let first = decoded.split('/').find(|s| !s.is_empty() && *s != ".");
    first == Some("packages")
}

/// Rejects paths under `/packages/`, which only the gated filter serves
fn outside_packages() -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::full()
        .and_then(|full: FullPath| async move {
            if is_packages_path(full.as_str()) {
                Err(warp::reject::not_found())
            } else {
                Ok(())
            }
        })
        .untuple_one()
}

/// `scope/name` of a `/packages/` request tail, decoded and split the way
/// `warp::fs::dir` resolves it. `None` when the tail names no package.
fn package_name(tail: &str) -> Result<Option<String>> {
    let invalid = || WebdeskError::InvalidPath(format!("/packages/{}", tail));
    let decoded = percent_decode_str(tail)
        .decode_utf8()
        .map_err(|_| invalid())?;

    let mut parts = Vec::new();
    for segment in decoded.split('/') {
        if segment.starts_with("..") || segment.contains('\\') {
            return Err(invalid());
        }
        if !segment.is_empty() && segment != "." {
            parts.push(segment);
        }
    }

    Ok(match parts.as_slice() {
        [scope, name, ..] => Some(format!("{}/{}", scope, name)),
        _ => None,
    })
}

fn session_cookie(app: &AppContext, ingress: &Ingress) -> Option<HeaderValue> {
    if !ingress.created {
        return None;
    }
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        app.config.http.session.name,
        ingress.ctx.session.id()
    );
    HeaderValue::from_str(&cookie).ok()
}

fn with_cookie(mut response: Response, cookie: Option<HeaderValue>) -> Response {
    if let Some(cookie) = cookie {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

/// Convert an [`ApiResponse`] into a warp reply
pub fn into_response(response: ApiResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let is_json = matches!(response.body, ResponseBody::Json(_));

    let body = match response.body {
        ResponseBody::Json(value) => Body::from(value.to_string()),
        ResponseBody::Bytes(data) => Body::from(data),
        ResponseBody::Stream(stream) => Body::wrap_stream(stream),
        ResponseBody::Empty => Body::empty(),
    };

    let mut reply = Response::new(body);
    *reply.status_mut() = status;

    let headers = reply.headers_mut();
    for (name, value) in response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("dropping invalid response header {}", name),
        }
    }
    if is_json && !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    reply
}

fn parse_body(body: &Bytes) -> Result<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    Ok(serde_json::from_slice::<Value>(body)?)
}

async fn dispatch(
    app: Arc<AppContext>,
    router: Arc<Router>,
    method: RouteMethod,
    path: FullPath,
    data: Result<Value>,
    ingress: Ingress,
) -> std::result::Result<Response, Rejection> {
    let cookie = session_cookie(&app, &ingress);
    let data = match data {
        Ok(data) => data,
        Err(e) => return Ok(with_cookie(into_response(ApiResponse::error(&e)), cookie)),
    };

    match router.dispatch(app, method, path.as_str(), data, ingress.ctx) {
        Some(handler) => Ok(with_cookie(into_response(handler.await), cookie)),
        None => Err(warp::reject::not_found()),
    }
}

/// Full warp filter for `app`
pub fn filter(app: Arc<AppContext>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let router = Arc::new(routes());
    let http = &app.config.http;
    let static_dir: PathBuf = http.static_dir.clone();
    let upload_limit = http.upload_limit;
    let ws_path = format!("/{}", http.websocket.path.trim_matches('/'));

    let socket = gate(http.websocket.enabled)
        .and(exact_path(ws_path))
        .and(warp::ws())
        .and(ingress(app.clone()))
        .and(with_app(app.clone()))
        .and(with_router(router.clone()))
        .map(|upgrade: warp::ws::Ws, ingress: Ingress, app: Arc<AppContext>, router: Arc<Router>| {
            let cookie = session_cookie(&app, &ingress);
            let Ingress { ctx, .. } = ingress;
            let reply = upgrade.on_upgrade(move |socket| {
                ws::handle_socket(socket, ctx.session, ctx.headers, app, router)
            });
            with_cookie(reply.into_response(), cookie)
        });

    let packages = warp::get()
        .and(warp::path("packages"))
        .and(warp::path::peek())
        .and(ingress(app.clone()))
        .and(with_app(app.clone()))
        .and_then(|peek: Peek, ingress: Ingress, app: Arc<AppContext>| async move {
            let name = match package_name(peek.as_str()) {
                Ok(name) => name,
                Err(e) => {
                    debug!("{}", e);
                    return Err(warp::reject::not_found());
                }
            };
            if let Some(name) = name {
                if let Err(e) = app.auth.check_package_permission(&ingress.ctx, &name).await {
                    return Err(warp::reject::custom(Forbidden(e.to_string())));
                }
            }
            Ok(())
        })
        .untuple_one()
        .and(warp::fs::dir(static_dir.join("packages")));

    let upload = warp::post()
        .and(warp::path!("FS" / "upload"))
        .and(ingress(app.clone()))
        .and(with_app(app.clone()))
        .and(warp::multipart::form().max_length(upload_limit))
        .then(|ingress: Ingress, app: Arc<AppContext>, form: warp::multipart::FormData| async move {
            let cookie = session_cookie(&app, &ingress);
            let response = fs::upload(app, ingress.ctx, form).await;
            with_cookie(into_response(response), cookie)
        });

    let api_post = warp::post()
        .and(warp::path::full())
        .and(ingress(app.clone()))
        .and(with_app(app.clone()))
        .and(with_router(router.clone()))
        .and(warp::body::bytes())
        .and_then(
            |path: FullPath, ingress: Ingress, app: Arc<AppContext>, router: Arc<Router>, body: Bytes| {
                dispatch(app, router, RouteMethod::Post, path, parse_body(&body), ingress)
            },
        );

    let api_get = warp::get()
        .and(warp::path::full())
        .and(warp::query::<HashMap<String, String>>())
        .and(ingress(app.clone()))
        .and(with_app(app.clone()))
        .and(with_router(router))
        .and_then(
            |path: FullPath,
             query: HashMap<String, String>,
             ingress: Ingress,
             app: Arc<AppContext>,
             router: Arc<Router>| {
                let data: Map<String, Value> = query
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                dispatch(app, router, RouteMethod::Get, path, Ok(Value::Object(data)), ingress)
            },
        );

    let assets = warp::get()
        .and(outside_packages())
        .and(warp::fs::dir(static_dir));

    socket
        .or(packages)
        .or(upload)
        .or(api_post)
        .or(api_get)
        .or(assets)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if let Some(Forbidden(message)) = err.find::<Forbidden>() {
        (StatusCode::FORBIDDEN, message.clone())
    } else if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<warp::reject::PayloadTooLarge>() {
        (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        error!("unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    };

    let reply = warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status);
    Ok(reply.into_response())
}

/// Bind `http.hostname:http.port` and serve until `shutdown` resolves
pub async fn serve<F>(app: Arc<AppContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let http = &app.config.http;
    let addr: SocketAddr = tokio::net::lookup_host((http.hostname.as_str(), http.port))
        .await?
        .next()
        .ok_or_else(|| WebdeskError::InvalidArgument(format!("cannot resolve {}", http.hostname)))?;

    let (bound, server) = warp::serve(filter(app.clone()))
        .try_bind_with_graceful_shutdown(addr, shutdown)
        .map_err(|e| WebdeskError::Transport(format!("failed to bind {}: {}", addr, e)))?;

    info!("Listening on http://{}", bound);
    server.await;
    info!("Server stopped");
    Ok(())
}
