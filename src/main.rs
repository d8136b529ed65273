//! webdesk server entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use webdesk::config::Config;
use webdesk::modules::ModuleLoader;
use webdesk::transport::WatchEvent;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Print usage information
fn print_usage() {
    eprintln!("Usage: webdesk <config.yaml>");
    eprintln!();
    eprintln!("webdesk - Web desktop server");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  webdesk /etc/webdesk/config.yaml");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("webdesk starting");
    info!("Loaded configuration from {:?}", config_path);

    let app = Arc::new(ModuleLoader::new(config).load().await?);

    let connections = app.connections.clone();
    let watching = app.vfs.watch(Arc::new(move |event: WatchEvent| {
        connections.broadcast(None, "vfs:watch", json!(event));
    }));
    info!("{} mount(s) watched", watching.len());

    let sessions = app.sessions.clone();
    let purge = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!("Purged {} expired session(s)", purged);
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let shutdown_tx = Mutex::new(Some(shutdown_tx));
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        if let Some(tx) = shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
    })?;

    info!("Press Ctrl+C to stop");
    webdesk::server::serve(app.clone(), async move {
        let _ = shutdown_rx.await;
    })
    .await?;

    info!("Shutting down");
    purge.abort();
    app.destroy().await;
    info!("Stopped, exiting");

    Ok(())
}
