//! Capture Router - Main entry point
//!
//! Runs the background and panel contexts as a daemon and exposes the
//! background context on a Unix socket speaking newline-delimited JSON
//! messages, replying with a capture outcome per message.

use capture_router::{BackgroundService, Config, ContextId, InProcessBus, Message, PanelService};
use capture_store::{CaptureOutcome, CaptureStore, SqliteKeyValue};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting capture router");

    // Load configuration
    let config = Config::load();

    if !config.general.enabled {
        info!("Pipeline is disabled in configuration, exiting");
        return Ok(());
    }

    // Persistence + store
    let kv = Arc::new(SqliteKeyValue::open(config.store.resolved_db_path())?);
    let store = Arc::new(CaptureStore::new(kv, config.store.store_config()));

    // Bus + context services
    let bus = Arc::new(InProcessBus::new());
    let background = Arc::new(BackgroundService::new(&config, store.clone(), bus.clone()));
    let panel = Arc::new(PanelService::new(&config, store.clone(), bus.clone()));

    let background_rx = bus.attach(ContextId::Background);
    let panel_rx = bus.attach(ContextId::Panel);
    tokio::spawn(background.clone().run(background_rx));
    tokio::spawn(panel.clone().run(panel_rx));

    // Replay persisted captures into the panel's render list
    panel.attach().await;

    // Remove existing socket file if present
    let socket_path = config.general.socket_path.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    info!("Capture router listening on {:?}", socket_path);

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let background = Arc::clone(&background);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, background).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Accept error: {}", e);
            }
        }
    }
}

/// Handle a single client connection: one JSON message per line, one
/// outcome per reply.
async fn handle_connection(
    stream: UnixStream,
    background: Arc<BackgroundService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let outcome = match serde_json::from_str::<Message>(&line) {
            Ok(message) => {
                info!("Received {} from {}", message.kind.as_str(), message.origin);
                background.handle_message(message).await
            }
            Err(e) => {
                warn!("Failed to parse message: {}", e);
                CaptureOutcome::failed(&format!("parse error: {}", e))
            }
        };

        let response = serde_json::to_string(&outcome)?;
        writer.write_all(response.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        line.clear();
    }

    Ok(())
}
