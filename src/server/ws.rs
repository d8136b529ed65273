//! WebSocket ingress
//!
//! Each text frame is `{path, args, _index}`. The path is dispatched as a
//! POST through the shared router and the reply carries the same `_index`.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use warp::http::HeaderMap;
use warp::ws::{Message, WebSocket};

use crate::context::RequestContext;
use crate::modules::AppContext;
use crate::server::router::{RouteMethod, Router};
use crate::session::Session;

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    path: String,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default, rename = "_index")]
    index: Option<Value>,
}

pub async fn handle_socket(
    socket: WebSocket,
    session: Session,
    headers: HeaderMap,
    app: Arc<AppContext>,
    router: Arc<Router>,
) {
    let sid = session.id().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_tx.send(message).await {
                debug!("socket write failed: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
    });

    let token = app.connections.add(&sid, tx.clone(), session.username());

    while let Some(message) = ws_rx.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!("socket read failed: {}", e);
                break;
            }
        };
        if message.is_close() {
            break;
        }
        let Ok(text) = message.to_str() else {
            trace!("ignoring non-text frame");
            continue;
        };

        let frame: Frame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("malformed socket frame: {}", e);
                continue;
            }
        };

        let ctx = RequestContext::new(session.clone(), headers.clone());
        let app = app.clone();
        let router = router.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let reply = dispatch(&app, &router, frame, ctx).await;
            let _ = tx.send(Message::text(reply.to_string()));
        });
    }

    app.connections.remove(&sid, token);
    writer.abort();
}

async fn dispatch(app: &Arc<AppContext>, router: &Router, frame: Frame, ctx: RequestContext) -> Value {
    ctx.session.touch();
    let data = frame.args.unwrap_or_else(|| Value::Object(Map::new()));

    let mut reply = match router.dispatch(app.clone(), RouteMethod::Post, &frame.path, data, ctx) {
        Some(handler) => handler.await.into_json().await,
        None => json!({ "error": format!("No such route: {}", frame.path) }),
    };

    if let (Some(index), Value::Object(map)) = (frame.index, &mut reply) {
        map.insert("_index".to_string(), index);
    }
    reply
}
