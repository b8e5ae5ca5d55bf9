//! Managed, self-healing connections.
//!
//! This module provides:
//! - Automatic reconnect with capped exponential backoff
//! - Heartbeat probes with a miss threshold
//! - Ordered buffering of outbound messages while the link is down
//!
//! # Example
//!
//! ```no_run
//! use resocket::connection::{ConnectionManager, EventHandlers, ManagerConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> resocket::Result<()> {
//! let config = ManagerConfig::default()
//!     .with_reconnect_interval(Duration::from_secs(1))
//!     .with_max_reconnect_attempts(10);
//!
//! let handlers = EventHandlers::new()
//!     .on_message(|msg| println!("received {msg:?}"));
//!
//! let manager = ConnectionManager::websocket("ws://127.0.0.1:9001", config, handlers)?;
//!
//! // Queued until the first open, then delivered in order.
//! manager.send("hello").await?;
//! manager.send_json(&serde_json::json!({ "type": "subscribe" })).await?;
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod handlers;
mod heartbeat;
mod manager;
mod queue;
mod state;
mod timer;

pub use config::{
    Backoff, HeartbeatConfig, ManagerConfig, ManagerOptions, OverflowPolicy, QueueConfig,
};
pub use handlers::EventHandlers;
pub use manager::ConnectionManager;
pub use state::{ConnectionState, ConnectionStats};
