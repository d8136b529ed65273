//! webdesk: server core of a browser-based web desktop
//!
//! Serves a virtual filesystem over pluggable transports, authenticates
//! users and gates filesystem and package operations by group, and
//! dispatches the same API over HTTP and WebSocket.
//!
//! # Architecture
//!
//! - **VFS**: parses `protocol://path` virtual paths against configured
//!   mounts and dispatches calls to the transport serving each mount.
//! - **Transports**: storage backends implementing the `Transport` trait
//!   (local filesystem, remote HTTP).
//! - **Auth**: pluggable `Authenticator` strategies plus the `Authorizer`
//!   that checks sessions, capabilities, mounts and package blacklists.
//! - **Server**: a warp front end where HTTP requests and WebSocket
//!   messages are normalized into one request context and routed through a
//!   shared route table.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webdesk::config::Config;
//! use webdesk::modules::AppContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//! let app = Arc::new(AppContext::load(config).await?);
//! webdesk::server::serve(app, futures::future::pending()).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod modules;
pub mod packages;
pub mod response;
pub mod server;
pub mod session;
pub mod storage;
pub mod transport;
pub mod vfs;

pub use error::{Result, WebdeskError};
