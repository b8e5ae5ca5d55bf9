//! Connection state management.

use std::time::Duration;

use tokio::time::Instant;

/// Connection state as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A link is being opened (initially or after a backoff delay).
    Connecting,
    /// The link is open and messages flow immediately.
    Open,
    /// A close was requested and the manager waits for the link to confirm.
    Closing,
    /// No link is open. A reconnect may be scheduled.
    Closed,
}

impl ConnectionState {
    /// Check if messages are delivered immediately.
    pub fn is_open(&self) -> bool {
        *self == ConnectionState::Open
    }

    /// Check if a link is being established.
    pub fn is_connecting(&self) -> bool {
        *self == ConnectionState::Connecting
    }

    /// Check if no link is open.
    pub fn is_closed(&self) -> bool {
        *self == ConnectionState::Closed
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Connecting
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Connection statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Number of successful opens.
    pub connect_count: u64,
    /// Number of links that closed uncleanly.
    pub failure_count: u64,
    /// Number of reconnect attempts started.
    pub reconnect_count: u64,
    /// Number of messages handed to an open link.
    pub messages_sent: u64,
    /// Number of application messages received.
    pub messages_received: u64,
    /// Number of messages that had to wait in the pending queue.
    pub messages_queued: u64,
    /// Number of queued messages evicted by the overflow policy.
    pub messages_dropped: u64,
    /// Number of heartbeat probes sent.
    pub heartbeats_sent: u64,
    /// Number of heartbeat deadlines that expired.
    pub heartbeat_misses: u64,
    /// Whether the manager abandoned reconnection.
    pub gave_up: bool,
    /// Time of last successful open.
    pub last_connected: Option<Instant>,
    /// Time of last close.
    pub last_disconnected: Option<Instant>,
}

impl ConnectionStats {
    /// Record a successful open.
    pub fn record_connect(&mut self) {
        self.connect_count += 1;
        self.gave_up = false;
        self.last_connected = Some(Instant::now());
    }

    /// Record a close, counting it as a failure if it was unclean.
    pub fn record_disconnect(&mut self, clean: bool) {
        if !clean {
            self.failure_count += 1;
        }
        self.last_disconnected = Some(Instant::now());
    }

    /// Record a reconnect attempt.
    pub fn record_reconnect(&mut self) {
        self.reconnect_count += 1;
    }

    /// Record a sent message.
    pub fn record_send(&mut self) {
        self.messages_sent += 1;
    }

    /// Record a received message.
    pub fn record_receive(&mut self) {
        self.messages_received += 1;
    }

    /// Get uptime of the current link, if one is open.
    pub fn uptime(&self) -> Option<Duration> {
        match (self.last_connected, self.last_disconnected) {
            (Some(up), Some(down)) if down >= up => None,
            (Some(up), _) => Some(up.elapsed()),
            (None, _) => None,
        }
    }
}
