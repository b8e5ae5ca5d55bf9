//! The connection lifecycle state machine.
//!
//! A single task owns every piece of mutable state: the current link, the
//! pending queue, the heartbeat and reconnect timers, and the counters.
//! Link notifications, timer expiries and application commands are each
//! handled as one uninterrupted reaction inside a `select!` loop.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{ResocketError, Result};
use crate::message::Message;
use crate::transport::{Connector, EventSender, Link, LinkEvent, TaggedEvent};
use crate::types::CloseFrame;

use super::config::ManagerConfig;
use super::handlers::EventHandlers;
use super::heartbeat::{Heartbeat, HeartbeatTimer, Miss};
use super::queue::{Enqueued, PendingQueue};
use super::state::{ConnectionState, ConnectionStats};
use super::timer::TimerSlot;

/// How long a requested close waits for the link to confirm.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Requests from the public handle.
pub(crate) enum Command {
    Send {
        message: Message,
        reply: oneshot::Sender<Result<()>>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<()>>,
    },
    Stats {
        reply: oneshot::Sender<ConnectionStats>,
    },
    Close,
}

pub(crate) struct Driver<C: Connector> {
    endpoint: String,
    config: ManagerConfig,
    connector: C,
    handlers: EventHandlers,

    link: Option<C::Link>,
    generation: u64,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,

    commands: mpsc::UnboundedReceiver<Command>,
    commands_open: bool,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,

    heartbeat: Heartbeat,
    reconnect_timer: TimerSlot,
    close_timer: TimerSlot,
    reconnecting: bool,
    reconnect_attempts: u32,
    terminated: bool,

    queue: PendingQueue,
    stats: ConnectionStats,
}

impl<C: Connector> Driver<C> {
    pub fn new(
        endpoint: String,
        config: ManagerConfig,
        connector: C,
        handlers: EventHandlers,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            heartbeat: Heartbeat::new(config.heartbeat.clone()),
            queue: PendingQueue::new(config.queue),
            endpoint,
            config,
            connector,
            handlers,
            link: None,
            generation: 0,
            state: ConnectionState::Connecting,
            state_tx,
            commands,
            commands_open: true,
            events_tx,
            events_rx,
            reconnect_timer: TimerSlot::new(),
            close_timer: TimerSlot::new(),
            reconnecting: false,
            reconnect_attempts: 0,
            terminated: false,
            stats: ConnectionStats::default(),
        }
    }

    /// Run until closed and the last link is gone.
    pub async fn run(mut self) {
        self.connect();

        while !(self.terminated && self.link.is_none()) {
            tokio::select! {
                biased;

                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all handles dropped");
                        self.commands_open = false;
                        self.close();
                    }
                },

                Some(tagged) = self.events_rx.recv() => self.handle_event(tagged),

                timer = self.heartbeat.next() => self.handle_heartbeat(timer),

                _ = self.reconnect_timer.fired() => self.handle_reconnect_due(),

                _ = self.close_timer.fired() => self.handle_close_grace(),
            }
        }

        debug!("driver stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn link_is_open(&self) -> bool {
        self.state.is_open() && self.link.as_ref().is_some_and(|link| link.state().is_open())
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Replace the current link with a fresh one.
    fn connect(&mut self) {
        self.generation += 1;
        let events = EventSender::new(self.generation, self.events_tx.clone());

        info!(
            endpoint = %self.endpoint,
            generation = self.generation,
            attempt = self.reconnect_attempts,
            "connecting"
        );
        self.set_state(ConnectionState::Connecting);
        // The previous link, if any, is dropped here; its events are stale.
        self.link = Some(self.connector.open(&self.endpoint, events));
    }

    fn handle_event(&mut self, tagged: TaggedEvent) {
        // An abandoned link keeps its generation until the next connect.
        if tagged.generation != self.generation || self.link.is_none() {
            debug!(
                generation = tagged.generation,
                current = self.generation,
                event = ?tagged.event,
                "ignoring event from replaced link"
            );
            return;
        }

        match tagged.event {
            LinkEvent::Open => self.on_open(),
            LinkEvent::Message(message) => self.on_message(message),
            LinkEvent::Close(frame) => self.on_close(frame),
            LinkEvent::Error(detail) => {
                warn!(generation = self.generation, error = %detail, "transport error");
                self.handlers.emit_error(&detail);
            }
        }
    }

    fn on_open(&mut self) {
        if self.terminated {
            debug!(generation = self.generation, "link opened after close request");
            return;
        }

        self.reconnecting = false;
        self.reconnect_attempts = 0;
        self.heartbeat.start();
        self.set_state(ConnectionState::Open);
        self.stats.record_connect();
        info!(endpoint = %self.endpoint, generation = self.generation, "connection open");

        self.flush();
        self.handlers.emit_open();
    }

    fn on_message(&mut self, message: Message) {
        if self.heartbeat.is_ack(&message) {
            if self.state.is_open() && self.heartbeat.acknowledge() {
                debug!(generation = self.generation, "heartbeat ack");
            } else {
                debug!(generation = self.generation, state = %self.state, "ignoring heartbeat ack");
            }
            return;
        }
        self.stats.record_receive();
        self.handlers.emit_message(&message);
    }

    fn on_close(&mut self, frame: CloseFrame) {
        self.heartbeat.stop();
        self.close_timer.cancel();
        self.link = None;
        self.set_state(ConnectionState::Closed);
        self.stats.record_disconnect(frame.is_clean());
        info!(
            endpoint = %self.endpoint,
            generation = self.generation,
            code = frame.code.0,
            reason = %frame.reason,
            "connection closed"
        );
        self.handlers.emit_close(&frame);

        if self.terminated || self.reconnecting || frame.is_clean() {
            return;
        }
        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            self.schedule_reconnect();
        } else {
            self.give_up();
        }
    }

    /// Explicit, terminal close.
    fn close(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.heartbeat.stop();
        self.reconnect_timer.cancel();
        self.reconnecting = false;

        if !self.queue.is_empty() {
            debug!(discarded = self.queue.len(), "discarding pending messages");
            self.queue.clear();
        }

        info!(endpoint = %self.endpoint, "closing");
        match self.link.as_mut() {
            Some(link) => {
                link.close(CloseFrame::manual());
                self.set_state(ConnectionState::Closing);
                self.close_timer.rearm(CLOSE_GRACE);
            }
            None => self.set_state(ConnectionState::Closed),
        }
    }

    /// The link never confirmed a requested close.
    fn handle_close_grace(&mut self) {
        if self.terminated {
            debug!(generation = self.generation, "close not confirmed, dropping link");
            self.link = None;
            self.set_state(ConnectionState::Closed);
            return;
        }
        warn!(
            generation = self.generation,
            "heartbeat close not confirmed, abandoning link"
        );
        self.on_close(CloseFrame::heartbeat_timeout());
    }

    // ── Reconnect ──────────────────────────────────────────────────────

    fn schedule_reconnect(&mut self) {
        self.reconnecting = true;
        let delay = self.config.backoff.delay_for_attempt(self.reconnect_attempts);
        let attempt = self.reconnect_attempts + 1;
        self.reconnect_timer.rearm(delay);

        info!(
            endpoint = %self.endpoint,
            attempt,
            ?delay,
            "reconnect scheduled"
        );
        self.handlers.emit_reconnect(attempt, delay);
    }

    fn handle_reconnect_due(&mut self) {
        self.reconnecting = false;
        self.reconnect_attempts += 1;
        self.stats.record_reconnect();
        self.connect();
    }

    fn give_up(&mut self) {
        self.stats.gave_up = true;
        warn!(
            endpoint = %self.endpoint,
            attempts = self.reconnect_attempts,
            "reconnect attempts exhausted, giving up"
        );
        self.handlers.emit_give_up(self.reconnect_attempts);
    }

    /// Restart after giving up (or skip a pending backoff delay).
    fn resume(&mut self) -> Result<()> {
        if self.terminated {
            return Err(ResocketError::Closed);
        }
        if self.link.is_some() {
            return Ok(());
        }
        self.reconnect_timer.cancel();
        self.reconnecting = false;
        self.reconnect_attempts = 0;
        self.stats.gave_up = false;
        self.connect();
        Ok(())
    }

    // ── Heartbeat ──────────────────────────────────────────────────────

    fn handle_heartbeat(&mut self, timer: HeartbeatTimer) {
        match timer {
            HeartbeatTimer::Probe(due) => {
                self.heartbeat.schedule_next_probe(due);
                if !self.link_is_open() {
                    return;
                }
                let Some(link) = self.link.as_mut() else {
                    return;
                };
                match link.send(self.heartbeat.probe()) {
                    Ok(()) => {
                        self.stats.heartbeats_sent += 1;
                        debug!(generation = self.generation, "heartbeat probe sent");
                        self.heartbeat.arm_deadline();
                    }
                    Err(e) => {
                        warn!(generation = self.generation, error = %e, "heartbeat probe failed");
                    }
                }
            }
            HeartbeatTimer::Deadline => {
                self.stats.heartbeat_misses += 1;
                match self.heartbeat.record_miss() {
                    Miss::Tolerated(misses) => {
                        warn!(generation = self.generation, misses, "heartbeat ack missed");
                    }
                    Miss::Exhausted(misses) => {
                        warn!(
                            generation = self.generation,
                            misses,
                            "heartbeat ack missed too many times, closing link"
                        );
                        if let Some(link) = self.link.as_mut() {
                            link.close(CloseFrame::heartbeat_timeout());
                            self.set_state(ConnectionState::Closing);
                            self.close_timer.rearm(CLOSE_GRACE);
                        }
                    }
                }
            }
        }
    }

    // ── Outbound ───────────────────────────────────────────────────────

    fn send(&mut self, message: Message) -> Result<()> {
        if self.terminated {
            return Err(ResocketError::Closed);
        }

        if self.queue.is_empty() && self.link_is_open() {
            if let Some(link) = self.link.as_mut() {
                match link.send(&message) {
                    Ok(()) => {
                        self.stats.record_send();
                        return Ok(());
                    }
                    Err(e) => {
                        debug!(generation = self.generation, error = %e, "send failed, queueing");
                    }
                }
            }
        }

        if let Enqueued::Evicted(evicted) = self.queue.push(message)? {
            self.stats.messages_dropped += 1;
            warn!(
                pending = self.queue.len(),
                dropped_bytes = evicted.len(),
                "pending queue full, dropped oldest message"
            );
        }
        self.stats.messages_queued += 1;
        Ok(())
    }

    /// Drain the pending queue in order while the link stays open.
    fn flush(&mut self) {
        let mut flushed = 0usize;
        while self.link_is_open() {
            let Some(message) = self.queue.pop() else {
                break;
            };
            let Some(link) = self.link.as_mut() else {
                self.queue.requeue(message);
                break;
            };
            if let Err(e) = link.send(&message) {
                debug!(error = %e, "flush interrupted");
                self.queue.requeue(message);
                break;
            }
            self.stats.record_send();
            flushed += 1;
        }

        if flushed > 0 {
            debug!(flushed, remaining = self.queue.len(), "flushed pending messages");
        }
    }

    // ── Commands ───────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { message, reply } => {
                let _ = reply.send(self.send(message));
            }
            Command::Reconnect { reply } => {
                let _ = reply.send(self.resume());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats.clone());
            }
            Command::Close => self.close(),
        }
    }
}
