//! Heartbeat liveness detection.
//!
//! Two independent timers: the probe timer recurs at the configured
//! interval, and the deadline timer measures how long the link has gone
//! without an acknowledgment. A slow acknowledgment never delays the next
//! probe. Misses accumulate until `max_misses`, after which the link is
//! considered dead.

use tokio::time::Instant;

use crate::message::Message;

use super::config::HeartbeatConfig;
use super::timer::TimerSlot;

/// Which heartbeat timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatTimer {
    /// The acknowledgment deadline expired.
    Deadline,
    /// Time to send a probe. Carries the instant the tick was due.
    Probe(Instant),
}

/// Result of an expired deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Miss {
    /// Below the threshold; the deadline was re-armed.
    Tolerated(u32),
    /// Threshold reached; both timers are stopped.
    Exhausted(u32),
}

#[derive(Debug)]
pub(crate) struct Heartbeat {
    config: HeartbeatConfig,
    probe: Message,
    probe_timer: TimerSlot,
    deadline: TimerSlot,
    misses: u32,
}

impl Heartbeat {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            probe: Message::text(config.payload.clone()),
            config,
            probe_timer: TimerSlot::new(),
            deadline: TimerSlot::new(),
            misses: 0,
        }
    }

    /// Start probing. The first probe is due one interval from now.
    pub fn start(&mut self) {
        self.misses = 0;
        self.deadline.cancel();
        self.probe_timer.rearm(self.config.interval);
    }

    pub fn stop(&mut self) {
        self.probe_timer.cancel();
        self.deadline.cancel();
    }

    /// Probing stays scheduled from `start` until `stop` or exhaustion.
    pub fn is_running(&self) -> bool {
        self.probe_timer.is_armed()
    }

    #[cfg(test)]
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// The probe payload.
    pub fn probe(&self) -> &Message {
        &self.probe
    }

    pub fn is_ack(&self, message: &Message) -> bool {
        message.is_heartbeat(&self.config.payload)
    }

    /// Schedule the probe after the one due at `due`.
    pub fn schedule_next_probe(&mut self, due: Instant) {
        self.probe_timer.rearm_at(due + self.config.interval);
    }

    /// Cancel any pending deadline and start a fresh acknowledgment window.
    pub fn arm_deadline(&mut self) {
        self.deadline.rearm(self.config.timeout);
    }

    /// An acknowledgment arrived: clear the miss count and re-arm.
    ///
    /// Returns `false` without touching the timers once stopped.
    pub fn acknowledge(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.misses = 0;
        self.arm_deadline();
        true
    }

    /// The deadline expired without an acknowledgment.
    pub fn record_miss(&mut self) -> Miss {
        self.misses += 1;
        if self.misses >= self.config.max_misses {
            self.stop();
            Miss::Exhausted(self.misses)
        } else {
            self.arm_deadline();
            Miss::Tolerated(self.misses)
        }
    }

    /// Wait for the next heartbeat timer.
    ///
    /// When both fall due at the same instant the deadline wins, so the
    /// link is declared dead before another probe could re-arm it.
    pub async fn next(&mut self) -> HeartbeatTimer {
        tokio::select! {
            biased;
            _ = self.deadline.fired() => HeartbeatTimer::Deadline,
            due = self.probe_timer.fired() => HeartbeatTimer::Probe(due),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::HEARTBEAT_PAYLOAD;
    use std::time::Duration;
    use tokio::time::timeout;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
            max_misses: 3,
            payload: HEARTBEAT_PAYLOAD.to_owned(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_after_one_interval() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(config());
        heartbeat.start();

        let timer = heartbeat.next().await;
        assert_eq!(timer, HeartbeatTimer::Probe(start + Duration::from_secs(30)));
        assert_eq!(Instant::now() - start, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_accumulate_to_exhaustion() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(config());
        heartbeat.start();

        let HeartbeatTimer::Probe(due) = heartbeat.next().await else {
            panic!("expected probe");
        };
        heartbeat.schedule_next_probe(due);
        heartbeat.arm_deadline();

        assert_eq!(heartbeat.next().await, HeartbeatTimer::Deadline);
        assert_eq!(heartbeat.record_miss(), Miss::Tolerated(1));
        assert_eq!(heartbeat.next().await, HeartbeatTimer::Deadline);
        assert_eq!(heartbeat.record_miss(), Miss::Tolerated(2));

        // Deadline and the second probe are both due at +60s.
        assert_eq!(heartbeat.next().await, HeartbeatTimer::Deadline);
        assert_eq!(Instant::now() - start, Duration::from_secs(60));
        assert_eq!(heartbeat.record_miss(), Miss::Exhausted(3));
        assert!(!heartbeat.is_running());
        assert!(timeout(Duration::from_secs(600), heartbeat.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_resets_misses() {
        let start = Instant::now();
        let mut heartbeat = Heartbeat::new(config());
        heartbeat.start();
        heartbeat.arm_deadline();

        assert_eq!(heartbeat.next().await, HeartbeatTimer::Deadline);
        assert_eq!(heartbeat.record_miss(), Miss::Tolerated(1));

        assert!(heartbeat.acknowledge());
        assert_eq!(heartbeat.misses(), 0);
        assert_eq!(heartbeat.next().await, HeartbeatTimer::Deadline);
        assert_eq!(Instant::now() - start, Duration::from_secs(20));
        assert_eq!(heartbeat.record_miss(), Miss::Tolerated(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledge_after_stop_is_ignored() {
        let mut heartbeat = Heartbeat::new(config());
        heartbeat.start();
        heartbeat.arm_deadline();
        heartbeat.stop();

        assert!(!heartbeat.acknowledge());
        assert!(!heartbeat.is_running());
        assert!(timeout(Duration::from_secs(600), heartbeat.next()).await.is_err());
    }

    #[test]
    fn test_ack_detection_uses_configured_payload() {
        let heartbeat = Heartbeat::new(HeartbeatConfig {
            payload: "ping".to_owned(),
            ..config()
        });
        assert!(heartbeat.is_ack(&Message::text("ping")));
        assert!(!heartbeat.is_ack(&Message::text(HEARTBEAT_PAYLOAD)));
        assert_eq!(heartbeat.probe(), &Message::text("ping"));
    }
}
