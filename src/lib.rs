//! Resilient client connections built on tokio.
//!
//! This crate wraps a message-oriented duplex link (a WebSocket by default)
//! in a manager that keeps it alive.
//!
//! # Features
//!
//! - Reconnect with exponential backoff, capped and attempt-limited
//! - Application-level heartbeats; a silent peer is closed with code 4000
//! - Outbound queue that preserves order across disconnects
//! - Lifecycle callbacks for open, message, close, error, reconnect and give-up
//! - Pluggable transports through the [`transport::Connector`] trait
//!
//! # Example
//!
//! ```no_run
//! use resocket::{ConnectionManager, EventHandlers, ManagerOptions};
//!
//! # async fn run() -> resocket::Result<()> {
//! let options = ManagerOptions::from_json(r#"{ "reconnectInterval": 1000, "heartbeatInterval": 15000 }"#)?;
//! let handlers = EventHandlers::new()
//!     .on_open(|| println!("connected"))
//!     .on_close(|frame| println!("closed: {frame}"));
//!
//! let manager = ConnectionManager::websocket("ws://127.0.0.1:9001", options.into(), handlers)?;
//! manager.wait_until_open().await?;
//! manager.send("ping").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!            connect()              Open event
//!   ──────► Connecting ───────────────────────► Open
//!               ▲                                 │
//!               │ backoff elapsed                 │ Close event / heartbeat timeout
//!               │                                 ▼
//!            (waiting) ◄──── unclean close ──── Closed ──── clean close / give up ──► (idle)
//! ```

pub mod connection;
pub mod error;
pub mod message;
pub mod transport;
pub mod types;

// Re-export commonly used types at the crate root
pub use connection::{
    Backoff, ConnectionManager, ConnectionState, ConnectionStats, EventHandlers, HeartbeatConfig,
    ManagerConfig, ManagerOptions, OverflowPolicy, QueueConfig,
};
pub use error::{ResocketError, Result};
pub use message::{HEARTBEAT_PAYLOAD, Message};
pub use types::{CloseCode, CloseFrame, LinkState};
