//! WebSocket echo client example.
//!
//! Connects to an echo server, sends a few messages and keeps the
//! connection alive with heartbeats. Stop the server and start it again to
//! watch the manager reconnect and flush what was queued in between.
//!
//! Run: cargo run --example echo_client -- ws://127.0.0.1:9001
//! Set RUST_LOG=resocket=debug for driver logs.

use std::time::Duration;

use resocket::{ConnectionManager, EventHandlers, ManagerOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:9001";

const OPTIONS: &str = r#"{
    "reconnectInterval": 1000,
    "maxReconnectInterval": 16000,
    "maxReconnectAttempts": 10,
    "heartbeatInterval": 15000,
    "heartbeatTimeout": 5000,
    "queueCapacity": 256,
    "queueOverflow": "dropOldest"
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
    let options = ManagerOptions::from_json(OPTIONS)?;

    let handlers = EventHandlers::new()
        .on_open(|| info!("connected"))
        .on_message(|msg| match msg.as_text() {
            Some(text) => info!(%text, "echo"),
            None => info!(bytes = msg.len(), "binary echo"),
        })
        .on_close(|frame| info!(%frame, "disconnected"))
        .on_error(|err| info!(%err, "transport error"))
        .on_reconnect(|attempt, delay| info!(attempt, ?delay, "reconnecting"))
        .on_give_up(|attempts| info!(attempts, "giving up"));

    let manager = ConnectionManager::websocket(endpoint, options.into(), handlers)?;

    for seq in 1..=5u32 {
        manager
            .send_json(&serde_json::json!({ "type": "echo", "seq": seq }))
            .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(60)) => {}
    }

    let stats = manager.stats().await?;
    info!(
        sent = stats.messages_sent,
        received = stats.messages_received,
        reconnects = stats.reconnect_count,
        "done"
    );
    manager.shutdown().await;
    Ok(())
}
