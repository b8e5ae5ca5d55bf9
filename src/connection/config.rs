//! Connection manager configuration types.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{ResocketError, Result};
use crate::message::HEARTBEAT_PAYLOAD;

/// Exponential reconnect backoff capped at a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first reconnect attempt.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl Backoff {
    /// Create a backoff policy.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Returns `min(base * 2^attempt, max)`; overflow saturates to `max`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5_000),
            max: Duration::from_millis(60_000),
        }
    }
}

/// Heartbeat (application-level liveness probe) configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between probes.
    pub interval: Duration,
    /// Time allowed for an acknowledgment before counting a miss.
    pub timeout: Duration,
    /// Consecutive misses before the link is declared dead.
    pub max_misses: u32,
    /// Payload used as both probe and acknowledgment.
    pub payload: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            timeout: Duration::from_millis(10_000),
            max_misses: 3,
            payload: HEARTBEAT_PAYLOAD.to_owned(),
        }
    }
}

/// What to do when the pending queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OverflowPolicy {
    /// Refuse the new message with [`ResocketError::QueueFull`].
    #[default]
    Reject,
    /// Evict the oldest queued message to make room.
    DropOldest,
}

/// Pending (outbound while disconnected) queue configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Maximum queued messages. `None` for unbounded.
    pub capacity: Option<usize>,
    /// Behaviour once `capacity` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Some(1024),
            overflow: OverflowPolicy::Reject,
        }
    }
}

impl QueueConfig {
    /// An unbounded queue.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            overflow: OverflowPolicy::Reject,
        }
    }

    /// A bounded queue with the given overflow policy.
    pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            capacity: Some(capacity),
            overflow,
        }
    }
}

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Reconnect backoff policy.
    pub backoff: Backoff,
    /// Reconnect attempts allowed without an intervening successful open.
    pub max_reconnect_attempts: u32,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Pending queue configuration.
    pub queue: QueueConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            max_reconnect_attempts: 5,
            heartbeat: HeartbeatConfig::default(),
            queue: QueueConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Set the base reconnect delay.
    pub fn with_reconnect_interval(mut self, base: Duration) -> Self {
        self.backoff.base = base;
        self
    }

    /// Set the reconnect delay ceiling.
    pub fn with_max_reconnect_interval(mut self, max: Duration) -> Self {
        self.backoff.max = max;
        self
    }

    /// Set the maximum number of reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the heartbeat probe interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat.interval = interval;
        self
    }

    /// Set the heartbeat acknowledgment deadline.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat.timeout = timeout;
        self
    }

    /// Set the number of consecutive misses that kill the link.
    pub fn with_max_heartbeat_misses(mut self, misses: u32) -> Self {
        self.heartbeat.max_misses = misses;
        self
    }

    /// Set the heartbeat sentinel payload.
    pub fn with_heartbeat_payload(mut self, payload: impl Into<String>) -> Self {
        self.heartbeat.payload = payload.into();
        self
    }

    /// Set the pending queue configuration.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Check the configuration for values the timers cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.backoff.base.is_zero() {
            return Err(ResocketError::invalid_config(
                "reconnect interval must be non-zero",
            ));
        }
        if self.backoff.max < self.backoff.base {
            return Err(ResocketError::invalid_config(
                "max reconnect interval must not be below the reconnect interval",
            ));
        }
        if self.heartbeat.interval.is_zero() || self.heartbeat.timeout.is_zero() {
            return Err(ResocketError::invalid_config(
                "heartbeat interval and timeout must be non-zero",
            ));
        }
        if self.heartbeat.max_misses == 0 {
            return Err(ResocketError::invalid_config(
                "max heartbeat timeouts must be at least 1",
            ));
        }
        if self.heartbeat.payload.is_empty() {
            return Err(ResocketError::invalid_config(
                "heartbeat payload must not be empty",
            ));
        }
        if self.queue.capacity == Some(0) {
            return Err(ResocketError::invalid_config(
                "queue capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Serializable options, in milliseconds, keyed the way client options
/// are usually written in JSON.
///
/// Every field is optional and falls back to the documented default. A
/// zero value also means "use the default", so `"maxReconnectAttempts": 0`
/// does not disable reconnects. Use [`ManagerConfig`] directly for values
/// the options cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerOptions {
    /// Base reconnect delay in milliseconds.
    pub reconnect_interval: u64,
    /// Reconnect delay ceiling in milliseconds.
    pub max_reconnect_interval: u64,
    /// Heartbeat probe interval in milliseconds.
    pub heartbeat_interval: u64,
    /// Heartbeat acknowledgment deadline in milliseconds.
    pub heartbeat_timeout: u64,
    /// Maximum reconnect attempts.
    pub max_reconnect_attempts: u32,
    /// Consecutive heartbeat misses before the link is closed.
    pub max_heartbeat_timeouts: u32,
    /// Pending queue capacity. `None` for unbounded.
    pub queue_capacity: Option<usize>,
    /// Pending queue overflow policy.
    pub queue_overflow: OverflowPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: 5_000,
            max_reconnect_interval: 60_000,
            heartbeat_interval: 30_000,
            heartbeat_timeout: 10_000,
            max_reconnect_attempts: 5,
            max_heartbeat_timeouts: 3,
            queue_capacity: Some(1024),
            queue_overflow: OverflowPolicy::Reject,
        }
    }
}

impl ManagerOptions {
    /// Parse options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn non_zero<T: PartialEq + Default>(value: T, fallback: T) -> T {
    if value == T::default() { fallback } else { value }
}

impl From<ManagerOptions> for ManagerConfig {
    fn from(options: ManagerOptions) -> Self {
        let defaults = ManagerOptions::default();
        let millis = |value, fallback| Duration::from_millis(non_zero(value, fallback));
        let capacity = match options.queue_capacity {
            Some(0) => defaults.queue_capacity,
            other => other,
        };

        ManagerConfig::default()
            .with_reconnect_interval(millis(options.reconnect_interval, defaults.reconnect_interval))
            .with_max_reconnect_interval(millis(
                options.max_reconnect_interval,
                defaults.max_reconnect_interval,
            ))
            .with_heartbeat_interval(millis(options.heartbeat_interval, defaults.heartbeat_interval))
            .with_heartbeat_timeout(millis(options.heartbeat_timeout, defaults.heartbeat_timeout))
            .with_max_reconnect_attempts(non_zero(
                options.max_reconnect_attempts,
                defaults.max_reconnect_attempts,
            ))
            .with_max_heartbeat_misses(non_zero(
                options.max_heartbeat_timeouts,
                defaults.max_heartbeat_timeouts,
            ))
            .with_queue(QueueConfig {
                capacity,
                overflow: options.queue_overflow,
            })
    }
}
