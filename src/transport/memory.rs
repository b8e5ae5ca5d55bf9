//! In-memory transport for tests.
//!
//! [`MemoryConnector`] hands every link it opens to a paired
//! [`MemoryRemote`]. The test then plays the peer: it decides when the link
//! opens, delivers messages, drops the link with any close code, and
//! inspects what the manager sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{ResocketError, Result};
use crate::message::Message;
use crate::types::{CloseFrame, LinkState};

use super::{Connector, EventSender, Link};

#[derive(Debug, Default)]
struct LinkRecord {
    state: LinkState,
    sent: Vec<Message>,
    close_requests: Vec<CloseFrame>,
    send_budget: Option<usize>,
}

fn lock(record: &Mutex<LinkRecord>) -> MutexGuard<'_, LinkRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connector producing in-memory links.
#[derive(Debug)]
pub struct MemoryConnector {
    opened_tx: mpsc::UnboundedSender<MemoryLinkHandle>,
    auto_open: bool,
    echo_close: bool,
}

impl MemoryConnector {
    /// Create a connector and the remote side that receives its links.
    pub fn new() -> (Self, MemoryRemote) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        (
            Self {
                opened_tx,
                auto_open: false,
                echo_close: true,
            },
            MemoryRemote { opened_rx },
        )
    }

    /// Open every link as soon as it is created.
    pub fn with_auto_open(mut self, enabled: bool) -> Self {
        self.auto_open = enabled;
        self
    }

    /// Answer close requests with a `Close` event carrying the same frame.
    ///
    /// Enabled by default. When disabled the link stays `Closing` until the
    /// remote calls [`MemoryLinkHandle::drop_with`].
    pub fn with_echo_close(mut self, enabled: bool) -> Self {
        self.echo_close = enabled;
        self
    }
}

impl Connector for MemoryConnector {
    type Link = MemoryLink;

    fn open(&self, endpoint: &str, events: EventSender) -> MemoryLink {
        let record = Arc::new(Mutex::new(LinkRecord::default()));
        let handle = MemoryLinkHandle {
            endpoint: endpoint.to_owned(),
            opened_at: Instant::now(),
            events: events.clone(),
            record: record.clone(),
        };

        if self.auto_open {
            handle.open();
        }
        let _ = self.opened_tx.send(handle);

        MemoryLink {
            events,
            record,
            echo_close: self.echo_close,
        }
    }
}

/// Manager-side end of an in-memory link.
#[derive(Debug)]
pub struct MemoryLink {
    events: EventSender,
    record: Arc<Mutex<LinkRecord>>,
    echo_close: bool,
}

impl Link for MemoryLink {
    fn state(&self) -> LinkState {
        lock(&self.record).state
    }

    fn send(&mut self, message: &Message) -> Result<()> {
        let mut record = lock(&self.record);
        if !record.state.is_open() {
            return Err(ResocketError::NotOpen);
        }
        match record.send_budget {
            Some(0) => return Err(ResocketError::transport("send budget exhausted")),
            Some(budget) => record.send_budget = Some(budget - 1),
            None => {}
        }
        record.sent.push(message.clone());
        Ok(())
    }

    fn close(&mut self, frame: CloseFrame) {
        let mut record = lock(&self.record);
        if matches!(record.state, LinkState::Closed) {
            return;
        }
        record.close_requests.push(frame.clone());
        if self.echo_close {
            record.state = LinkState::Closed;
            drop(record);
            self.events.close(frame);
        } else {
            record.state = LinkState::Closing;
        }
    }
}

/// Receiver of links opened by a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryRemote {
    opened_rx: mpsc::UnboundedReceiver<MemoryLinkHandle>,
}

impl MemoryRemote {
    /// Wait for the manager to open the next link.
    pub async fn next_link(&mut self) -> Option<MemoryLinkHandle> {
        self.opened_rx.recv().await
    }

    /// Take an already opened link without waiting.
    pub fn try_next_link(&mut self) -> Option<MemoryLinkHandle> {
        self.opened_rx.try_recv().ok()
    }
}

/// Peer-side view of an in-memory link.
#[derive(Debug, Clone)]
pub struct MemoryLinkHandle {
    endpoint: String,
    opened_at: Instant,
    events: EventSender,
    record: Arc<Mutex<LinkRecord>>,
}

impl MemoryLinkHandle {
    /// Endpoint the manager asked for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Instant at which the manager opened this link.
    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    /// Generation the manager assigned to this link.
    pub fn generation(&self) -> u64 {
        self.events.generation()
    }

    /// Current link state.
    pub fn state(&self) -> LinkState {
        lock(&self.record).state
    }

    /// Complete the handshake.
    pub fn open(&self) {
        lock(&self.record).state = LinkState::Open;
        self.events.open();
    }

    /// Deliver a message to the manager.
    pub fn deliver(&self, message: impl Into<Message>) {
        self.events.message(message);
    }

    /// Close the link from the peer side.
    pub fn drop_with(&self, frame: CloseFrame) {
        lock(&self.record).state = LinkState::Closed;
        self.events.close(frame);
    }

    /// Report a transport error without closing the link.
    pub fn report_error(&self, detail: &str) {
        self.events.error(detail);
    }

    /// Fail the link: an error followed by an abnormal close.
    pub fn fail(&self, detail: &str) {
        lock(&self.record).state = LinkState::Closed;
        self.events.error(detail);
        self.events.close(CloseFrame::abnormal(detail));
    }

    /// Accept only `count` more sends; later ones fail while the link
    /// still reports open.
    pub fn fail_sends_after(&self, count: usize) {
        lock(&self.record).send_budget = Some(count);
    }

    /// Messages the manager sent over this link, in order.
    pub fn sent(&self) -> Vec<Message> {
        lock(&self.record).sent.clone()
    }

    /// Close frames the manager requested on this link.
    pub fn close_requests(&self) -> Vec<CloseFrame> {
        lock(&self.record).close_requests.clone()
    }
}
