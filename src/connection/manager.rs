//! Public handle to a managed connection.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, info_span};

use crate::error::{ResocketError, Result};
use crate::message::Message;
use crate::transport::Connector;

use super::config::ManagerConfig;
use super::driver::{Command, Driver};
use super::handlers::EventHandlers;
use super::state::{ConnectionState, ConnectionStats};

/// A connection that reconnects, probes liveness and buffers while down.
///
/// Constructing a manager spawns its driver task on the current Tokio
/// runtime and immediately starts connecting. Dropping every handle has
/// the same effect as [`close`](Self::close).
pub struct ConnectionManager {
    endpoint: String,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl ConnectionManager {
    /// Create a manager for `endpoint` and start connecting.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect<C: Connector>(
        endpoint: impl Into<String>,
        config: ManagerConfig,
        connector: C,
        handlers: EventHandlers,
    ) -> Result<Self> {
        config.validate()?;

        let endpoint = endpoint.into();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let driver = Driver::new(
            endpoint.clone(),
            config,
            connector,
            handlers,
            commands_rx,
            state_tx,
        );
        let span = info_span!("resocket.driver", endpoint = %endpoint);
        let task = tokio::spawn(driver.run().instrument(span));

        Ok(Self {
            endpoint,
            commands: commands_tx,
            state: state_rx,
            task,
        })
    }

    /// Create a manager over the WebSocket transport.
    #[cfg(feature = "websocket")]
    pub fn websocket(
        endpoint: impl Into<String>,
        config: ManagerConfig,
        handlers: EventHandlers,
    ) -> Result<Self> {
        Self::connect(
            endpoint,
            config,
            crate::transport::websocket::WsConnector::new(),
            handlers,
        )
    }

    /// Get the target endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Check if messages are currently delivered immediately.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Watch connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the manager reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ResocketError::Closed)
    }

    /// Wait until a link is open.
    pub async fn wait_until_open(&self) -> Result<()> {
        self.wait_for_state(ConnectionState::Open).await
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ResocketError::Closed)
    }

    /// Send a message, or queue it until the next open.
    ///
    /// Fails with [`ResocketError::QueueFull`] when the pending queue is at
    /// capacity under the `Reject` policy, and with
    /// [`ResocketError::Closed`] after [`close`](Self::close).
    pub async fn send(&self, message: impl Into<Message>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send {
            message: message.into(),
            reply,
        })?;
        rx.await.map_err(|_| ResocketError::Closed)?
    }

    /// Serialize a value as JSON and send it.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(Message::json(value)?).await
    }

    /// Connect again after the manager gave up, resetting the attempt count.
    ///
    /// While a reconnect delay is pending, this skips the rest of the delay.
    /// No-op while a link exists.
    pub async fn reconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Reconnect { reply })?;
        rx.await.map_err(|_| ResocketError::Closed)?
    }

    /// Get a snapshot of the connection statistics.
    pub async fn stats(&self) -> Result<ConnectionStats> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Stats { reply })?;
        rx.await.map_err(|_| ResocketError::Closed)
    }

    /// Close the connection for good. Idempotent.
    ///
    /// Cancels every timer, discards pending messages and closes the link
    /// with a normal close code. No reconnect follows.
    pub fn close(&self) {
        let _ = self.command(Command::Close);
    }

    /// Wait for the driver to finish after a close.
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        // The driver drops the sender on exit.
        while state.changed().await.is_ok() {}
    }

    /// Close and wait for the driver to finish.
    pub async fn shutdown(self) {
        self.close();
        let _ = self.task.await;
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::{OverflowPolicy, QueueConfig};
    use crate::message::HEARTBEAT_PAYLOAD;
    use crate::transport::memory::{MemoryConnector, MemoryLinkHandle, MemoryRemote};
    use crate::types::{CloseCode, CloseFrame};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::{Instant, sleep};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording_handlers() -> (EventHandlers, Log) {
        let log: Log = Arc::default();
        let (a, b, c, d, e, f) = (
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
        );
        let handlers = EventHandlers::new()
            .on_open(move || a.lock().unwrap().push("open".into()))
            .on_message(move |m| {
                let text = m.as_text().unwrap_or("<binary>");
                b.lock().unwrap().push(format!("message {text}"));
            })
            .on_close(move |frame| c.lock().unwrap().push(format!("close {}", frame.code)))
            .on_error(move |err| d.lock().unwrap().push(format!("error {err}")))
            .on_reconnect(move |n, delay| {
                let ms = delay.as_millis();
                e.lock().unwrap().push(format!("reconnect {n} {ms}ms"));
            })
            .on_give_up(move |n| f.lock().unwrap().push(format!("give up {n}")));
        (handlers, log)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn start(config: ManagerConfig, connector: MemoryConnector) -> (ConnectionManager, Log) {
        let (handlers, log) = recording_handlers();
        let manager =
            ConnectionManager::connect("mem://feed", config, connector, handlers).unwrap();
        (manager, log)
    }

    async fn open_link(manager: &ConnectionManager, remote: &mut MemoryRemote) -> MemoryLinkHandle {
        let link = remote.next_link().await.unwrap();
        link.open();
        manager.wait_until_open().await.unwrap();
        link
    }

    fn fast_backoff() -> ManagerConfig {
        ManagerConfig::default()
            .with_reconnect_interval(Duration::from_millis(1000))
            .with_max_reconnect_interval(Duration::from_millis(8000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_invalid_config() {
        let (connector, _remote) = MemoryConnector::new();
        let config = ManagerConfig::default().with_heartbeat_timeout(Duration::ZERO);
        let result = ConnectionManager::connect("mem://feed", config, connector, EventHandlers::new());
        assert!(matches!(result, Err(ResocketError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connects_immediately() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(ManagerConfig::default(), connector);
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.endpoint(), "mem://feed");

        let link = open_link(&manager, &mut remote).await;
        assert_eq!(link.endpoint(), "mem://feed");
        assert!(manager.is_open());
        assert_eq!(entries(&log), vec!["open"]);
        assert_eq!(manager.stats().await.unwrap().connect_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_double_between_failures() {
        let (connector, mut remote) = MemoryConnector::new();
        let (_manager, log) = start(fast_backoff(), connector);

        let mut opened = Vec::new();
        for _ in 0..4 {
            let link = remote.next_link().await.unwrap();
            opened.push(link.opened_at());
            link.fail("connection refused");
        }
        sleep(Duration::from_millis(1)).await;

        let gaps: Vec<_> = opened.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
            ]
        );
        let scheduled: Vec<_> = entries(&log)
            .into_iter()
            .filter(|e| e.starts_with("reconnect"))
            .collect();
        assert_eq!(
            scheduled,
            vec![
                "reconnect 1 1000ms",
                "reconnect 2 2000ms",
                "reconnect 3 4000ms",
                "reconnect 4 8000ms",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let (connector, mut remote) = MemoryConnector::new();
        let config = fast_backoff().with_max_reconnect_attempts(10);
        let (_manager, _log) = start(config, connector);

        let mut opened = Vec::new();
        for _ in 0..7 {
            let link = remote.next_link().await.unwrap();
            opened.push(link.opened_at());
            link.drop_with(CloseFrame::abnormal("reset"));
        }

        let gaps: Vec<_> = opened.windows(2).map(|w| (w[1] - w[0]).as_millis()).collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 8000, 8000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_resets_backoff() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(fast_backoff(), connector);

        remote.next_link().await.unwrap().fail("refused");
        remote.next_link().await.unwrap().fail("refused");

        let link = open_link(&manager, &mut remote).await;
        let dropped_at = Instant::now();
        link.drop_with(CloseFrame::abnormal("reset"));

        let next = remote.next_link().await.unwrap();
        assert_eq!(next.opened_at() - dropped_at, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_close_never_reconnects() {
        for code in [CloseCode::NORMAL, CloseCode::GOING_AWAY] {
            let (connector, mut remote) = MemoryConnector::new();
            let (manager, log) = start(fast_backoff(), connector);

            let link = open_link(&manager, &mut remote).await;
            link.drop_with(CloseFrame::new(code, "bye"));
            manager.wait_for_state(ConnectionState::Closed).await.unwrap();

            sleep(Duration::from_secs(600)).await;
            assert!(remote.try_next_link().is_none());
            assert_eq!(manager.state(), ConnectionState::Closed);
            assert_eq!(entries(&log), vec!["open".to_owned(), format!("close {code}")]);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_trigger_reconnect() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(fast_backoff(), connector);

        let link = open_link(&manager, &mut remote).await;
        link.report_error("flaky read");
        sleep(Duration::from_secs(20)).await;

        assert!(remote.try_next_link().is_none());
        assert!(manager.is_open());
        assert_eq!(entries(&log), vec!["open", "error flaky read"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_closes_at_third_deadline() {
        let (connector, mut remote) = MemoryConnector::new();
        let connector = connector.with_echo_close(false);
        let config = ManagerConfig::default()
            .with_heartbeat_interval(Duration::from_millis(30_000))
            .with_heartbeat_timeout(Duration::from_millis(10_000))
            .with_max_heartbeat_misses(3);
        let (manager, _log) = start(config, connector);

        let link = open_link(&manager, &mut remote).await;
        let opened = Instant::now();

        manager.wait_for_state(ConnectionState::Closing).await.unwrap();
        assert_eq!(Instant::now() - opened, Duration::from_millis(60_000));
        assert_eq!(link.close_requests(), vec![CloseFrame::heartbeat_timeout()]);
        assert_eq!(link.sent(), vec![Message::text(HEARTBEAT_PAYLOAD)]);

        sleep(Duration::from_secs(600)).await;
        assert_eq!(link.close_requests().len(), 1);
        assert_eq!(link.sent().len(), 1);

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.heartbeats_sent, 1);
        assert_eq!(stats.heartbeat_misses, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_timeout_leads_to_reconnect() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(fast_backoff(), connector);

        let link = open_link(&manager, &mut remote).await;
        let opened = Instant::now();

        let next = remote.next_link().await.unwrap();
        assert_eq!(link.close_requests().len(), 1);
        assert_eq!(next.opened_at() - opened, Duration::from_millis(61_000));
        assert!(entries(&log).contains(&"close 4000".to_owned()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_heartbeat_close_abandons_link() {
        let (connector, mut remote) = MemoryConnector::new();
        let connector = connector.with_echo_close(false);
        let (manager, log) = start(fast_backoff(), connector);

        let link = open_link(&manager, &mut remote).await;
        let opened = Instant::now();

        // Closed at +60s, abandoned after the 5s grace, retried 1s later.
        let next = remote.next_link().await.unwrap();
        assert_eq!(next.opened_at() - opened, Duration::from_millis(66_000));
        assert_eq!(link.close_requests(), vec![CloseFrame::heartbeat_timeout()]);

        link.drop_with(CloseFrame::heartbeat_timeout());
        next.open();
        manager.wait_until_open().await.unwrap();
        sleep(Duration::from_millis(1)).await;

        assert_eq!(
            entries(&log),
            vec!["open", "close 4000", "reconnect 1 1000ms", "open"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_after_heartbeat_close_is_ignored() {
        let (connector, mut remote) = MemoryConnector::new();
        let connector = connector.with_echo_close(false);
        let (manager, _log) = start(ManagerConfig::default(), connector);

        let link = open_link(&manager, &mut remote).await;
        manager.wait_for_state(ConnectionState::Closing).await.unwrap();
        link.deliver(HEARTBEAT_PAYLOAD);
        sleep(Duration::from_secs(600)).await;

        assert_eq!(link.close_requests(), vec![CloseFrame::heartbeat_timeout()]);
        assert_eq!(manager.stats().await.unwrap().heartbeat_misses, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_after_close_is_ignored() {
        let (connector, mut remote) = MemoryConnector::new();
        let connector = connector.with_echo_close(false);
        let config = ManagerConfig::default().with_heartbeat_timeout(Duration::from_secs(1));
        let (manager, _log) = start(config, connector);

        let link = open_link(&manager, &mut remote).await;
        manager.close();
        link.deliver(HEARTBEAT_PAYLOAD);
        sleep(Duration::from_secs(3)).await;

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.heartbeat_misses, 0);
        assert_eq!(link.close_requests(), vec![CloseFrame::manual()]);
        assert!(link.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_keeps_remaining_messages() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(fast_backoff(), connector);

        for text in ["a", "b", "c"] {
            manager.send(text).await.unwrap();
        }
        let first = remote.next_link().await.unwrap();
        first.fail_sends_after(1);
        first.open();
        manager.wait_until_open().await.unwrap();
        assert_eq!(first.sent(), vec![Message::text("a")]);

        // Still behind the unsent backlog.
        manager.send("d").await.unwrap();
        assert_eq!(first.sent(), vec![Message::text("a")]);

        first.fail("write failed");
        let second = open_link(&manager, &mut remote).await;
        assert_eq!(
            second.sent(),
            vec![Message::text("b"), Message::text("c"), Message::text("d")]
        );
        assert_eq!(manager.stats().await.unwrap().messages_sent, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_acks_keep_link_alive() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(ManagerConfig::default(), connector);

        let link = open_link(&manager, &mut remote).await;
        sleep(Duration::from_millis(30_500)).await;
        for _ in 0..10 {
            link.deliver(HEARTBEAT_PAYLOAD);
            sleep(Duration::from_secs(30)).await;
        }

        assert!(manager.is_open());
        assert!(link.close_requests().is_empty());
        assert_eq!(entries(&log), vec!["open"]);
        assert!(link.sent().iter().all(|m| m.is_heartbeat(HEARTBEAT_PAYLOAD)));
        assert_eq!(manager.stats().await.unwrap().messages_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_messages_flush_in_order() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(ManagerConfig::default(), connector);

        manager.send("a").await.unwrap();
        manager.send("b").await.unwrap();

        let link = open_link(&manager, &mut remote).await;
        assert_eq!(link.sent(), vec![Message::text("a"), Message::text("b")]);

        manager.send("c").await.unwrap();
        assert_eq!(
            link.sent(),
            vec![Message::text("a"), Message::text("b"), Message::text("c")]
        );

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.messages_queued, 2);
        assert_eq!(stats.messages_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_queued_across_reconnect() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(fast_backoff(), connector);

        let first = open_link(&manager, &mut remote).await;
        first.drop_with(CloseFrame::abnormal("reset"));
        manager.wait_for_state(ConnectionState::Closed).await.unwrap();

        manager.send_json(&serde_json::json!({"seq": 1})).await.unwrap();
        manager.send_json(&serde_json::json!({"seq": 2})).await.unwrap();
        assert!(first.sent().is_empty());

        let second = open_link(&manager, &mut remote).await;
        assert_eq!(
            second.sent(),
            vec![Message::text(r#"{"seq":1}"#), Message::text(r#"{"seq":2}"#)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_overflow_rejects() {
        let (connector, _remote) = MemoryConnector::new();
        let config = ManagerConfig::default()
            .with_queue(QueueConfig::bounded(2, OverflowPolicy::Reject));
        let (manager, _log) = start(config, connector);

        manager.send("a").await.unwrap();
        manager.send("b").await.unwrap();
        let err = manager.send("c").await.unwrap_err();
        assert!(matches!(err, ResocketError::QueueFull { capacity: 2 }));
        assert!(err.is_backpressure());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_overflow_drops_oldest() {
        let (connector, mut remote) = MemoryConnector::new();
        let config = ManagerConfig::default()
            .with_queue(QueueConfig::bounded(2, OverflowPolicy::DropOldest));
        let (manager, _log) = start(config, connector);

        for text in ["a", "b", "c"] {
            manager.send(text).await.unwrap();
        }
        let link = open_link(&manager, &mut remote).await;
        assert_eq!(link.sent(), vec![Message::text("b"), Message::text("c")]);
        assert_eq!(manager.stats().await.unwrap().messages_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_forwarded_without_heartbeats() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(ManagerConfig::default(), connector);

        let link = open_link(&manager, &mut remote).await;
        link.deliver("hello");
        link.deliver(HEARTBEAT_PAYLOAD);
        link.deliver(vec![0u8, 1, 2]);
        sleep(Duration::from_millis(1)).await;

        assert_eq!(entries(&log), vec!["open", "message hello", "message <binary>"]);
        assert_eq!(manager.stats().await.unwrap().messages_received, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_link_events_are_ignored() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(fast_backoff(), connector);

        let old = open_link(&manager, &mut remote).await;
        old.drop_with(CloseFrame::abnormal("reset"));
        let new = remote.next_link().await.unwrap();
        assert!(new.generation() > old.generation());

        old.deliver("late message");
        old.open();
        old.drop_with(CloseFrame::abnormal("late close"));
        new.open();
        manager.wait_until_open().await.unwrap();
        old.drop_with(CloseFrame::abnormal("even later"));
        sleep(Duration::from_secs(30)).await;

        assert!(manager.is_open());
        assert!(remote.try_next_link().is_none());
        let log = entries(&log);
        assert!(!log.iter().any(|e| e.contains("late message")));
        assert_eq!(log.iter().filter(|e| e.starts_with("close")).count(), 1);
        assert_eq!(log.iter().filter(|e| *e == "open").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts_and_resumes() {
        let (connector, mut remote) = MemoryConnector::new();
        let config = fast_backoff().with_max_reconnect_attempts(2);
        let (manager, log) = start(config, connector);

        for _ in 0..3 {
            remote.next_link().await.unwrap().fail("refused");
        }
        manager.wait_for_state(ConnectionState::Closed).await.unwrap();
        sleep(Duration::from_secs(600)).await;
        assert!(remote.try_next_link().is_none());

        let log_entries = entries(&log);
        assert_eq!(log_entries.iter().filter(|e| e.starts_with("give up")).count(), 1);
        assert_eq!(log_entries.last().map(String::as_str), Some("give up 2"));
        assert!(manager.stats().await.unwrap().gave_up);

        let before = Instant::now();
        manager.reconnect().await.unwrap();
        let link = remote.next_link().await.unwrap();
        assert_eq!(link.opened_at(), before);
        link.open();
        manager.wait_until_open().await.unwrap();
        assert!(!manager.stats().await.unwrap().gave_up);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_is_noop_while_linked() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(ManagerConfig::default(), connector);

        let _link = open_link(&manager, &mut remote).await;
        manager.reconnect().await.unwrap();
        assert!(remote.try_next_link().is_none());
        assert!(manager.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_terminal() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(fast_backoff(), connector);

        let link = open_link(&manager, &mut remote).await;
        manager.close();
        manager.close();
        manager.wait_for_state(ConnectionState::Closed).await.unwrap();

        assert_eq!(link.close_requests(), vec![CloseFrame::manual()]);
        sleep(Duration::from_secs(600)).await;
        assert!(link.sent().is_empty());
        assert!(remote.try_next_link().is_none());
        assert_eq!(entries(&log), vec!["open", "close 1000"]);

        manager.closed().await;
        assert!(matches!(manager.send("late").await, Err(ResocketError::Closed)));
        assert!(matches!(manager.reconnect().await, Err(ResocketError::Closed)));
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_reconnect() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, log) = start(fast_backoff(), connector);

        remote.next_link().await.unwrap().fail("refused");
        manager.wait_for_state(ConnectionState::Closed).await.unwrap();
        manager.close();

        sleep(Duration::from_secs(600)).await;
        assert!(remote.try_next_link().is_none());
        assert_eq!(
            entries(&log),
            vec!["error refused", "close 1006", "reconnect 1 1000ms"]
        );
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_on_unconfirmed_link() {
        let (connector, mut remote) = MemoryConnector::new();
        let connector = connector.with_echo_close(false);
        let (manager, _log) = start(ManagerConfig::default(), connector);

        let link = open_link(&manager, &mut remote).await;
        let started = Instant::now();
        manager.shutdown().await;
        assert_eq!(Instant::now() - started, Duration::from_secs(5));
        assert_eq!(link.close_requests(), vec![CloseFrame::manual()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_closes() {
        let (connector, mut remote) = MemoryConnector::new();
        let (manager, _log) = start(ManagerConfig::default(), connector);

        let link = open_link(&manager, &mut remote).await;
        drop(manager);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(link.close_requests(), vec![CloseFrame::manual()]);
    }
}
