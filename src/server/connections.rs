//! Open WebSocket connections, keyed by session id

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};
use warp::ws::Message;

struct Connection {
    /// Identifies the socket currently registered for the session
    token: u64,
    sender: UnboundedSender<Message>,
    username: Option<String>,
}

#[derive(Clone, Default)]
pub struct Connections {
    sockets: Arc<DashMap<String, Connection>>,
    next_token: Arc<AtomicU64>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the socket for `sid`, replacing any earlier one.
    ///
    /// Returns the token to pass to [`Connections::remove`].
    pub fn add(&self, sid: &str, sender: UnboundedSender<Message>, username: Option<String>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        debug!("socket {} connected for session {}", token, sid);
        self.sockets.insert(
            sid.to_string(),
            Connection {
                token,
                sender,
                username,
            },
        );
        token
    }

    /// Unregister `sid` if `token` is still its registered socket
    pub fn remove(&self, sid: &str, token: u64) {
        if self
            .sockets
            .remove_if(sid, |_, conn| conn.token == token)
            .is_some()
        {
            debug!("socket {} closed for session {}", token, sid);
        }
    }

    /// Record which user a session's socket belongs to (after login/logout)
    pub fn set_active_user(&self, sid: &str, username: Option<&str>) {
        if let Some(mut conn) = self.sockets.get_mut(sid) {
            conn.username = username.map(str::to_string);
        }
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Send `{action, args}` to every socket, or only to `username`'s.
    ///
    /// Returns the number of sockets the message was queued for.
    pub fn broadcast(&self, username: Option<&str>, action: &str, args: Value) -> usize {
        let text = json!({ "action": action, "args": args }).to_string();
        let mut sent = 0;

        for conn in self.sockets.iter() {
            let wanted = match username {
                Some(name) => conn.username.as_deref() == Some(name),
                None => true,
            };
            if wanted && conn.sender.send(Message::text(text.clone())).is_ok() {
                sent += 1;
            }
        }

        trace!("broadcast {} to {} socket(s)", action, sent);
        sent
    }

    /// Ask every socket to close
    pub fn close_all(&self) {
        for conn in self.sockets.iter() {
            let _ = conn.sender.send(Message::close());
        }
        self.sockets.clear();
    }
}
