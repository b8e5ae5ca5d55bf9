//! Transport abstraction consumed by the connection manager.
//!
//! A [`Connector`] opens [`Link`]s. A link is a single duplex channel
//! with the semantics of a browser-style socket:
//!
//! - `open` returns immediately, the handshake runs in the background
//! - the outcome is reported through an [`EventSender`]: exactly one of
//!   `Open` or `Error` followed by `Close`
//! - `send` is only valid while the link reports [`LinkState::Open`]
//!
//! Every event is tagged with the generation of the link that produced it,
//! so notifications from a replaced link never reach the state of its
//! successor.
//!
//! # Example
//!
//! ```no_run
//! use resocket::transport::{Connector, EventSender, Link};
//! use resocket::{CloseFrame, LinkState, Message, Result};
//!
//! struct NullLink;
//!
//! impl Link for NullLink {
//!     fn state(&self) -> LinkState {
//!         LinkState::Closed
//!     }
//!
//!     fn send(&mut self, _message: &Message) -> Result<()> {
//!         Err(resocket::ResocketError::NotOpen)
//!     }
//!
//!     fn close(&mut self, _frame: CloseFrame) {}
//! }
//!
//! struct NullConnector;
//!
//! impl Connector for NullConnector {
//!     type Link = NullLink;
//!
//!     fn open(&self, _endpoint: &str, events: EventSender) -> NullLink {
//!         events.error("unreachable");
//!         events.close(CloseFrame::abnormal("unreachable"));
//!         NullLink
//!     }
//! }
//! ```

use tokio::sync::mpsc;

use crate::error::Result;
use crate::message::Message;
use crate::types::{CloseFrame, LinkState};

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
#[cfg(feature = "websocket")]
pub mod websocket;

/// Notification emitted by a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link is open and can carry messages.
    Open,
    /// A message arrived from the peer.
    Message(Message),
    /// The link closed. No further events follow.
    Close(CloseFrame),
    /// A transport error occurred. A `Close` usually follows.
    Error(String),
}

/// An event together with the generation of the link that emitted it.
#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub generation: u64,
    pub event: LinkEvent,
}

/// Handle a link uses to report its notifications to the manager.
#[derive(Debug, Clone)]
pub struct EventSender {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSender {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the link this sender belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Emit an event. Returns `false` if the manager is gone.
    pub fn emit(&self, event: LinkEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Report that the link opened.
    pub fn open(&self) -> bool {
        self.emit(LinkEvent::Open)
    }

    /// Report an inbound message.
    pub fn message(&self, message: impl Into<Message>) -> bool {
        self.emit(LinkEvent::Message(message.into()))
    }

    /// Report that the link closed.
    pub fn close(&self, frame: CloseFrame) -> bool {
        self.emit(LinkEvent::Close(frame))
    }

    /// Report a transport error.
    pub fn error(&self, detail: impl Into<String>) -> bool {
        self.emit(LinkEvent::Error(detail.into()))
    }

    /// Check if the manager stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A live duplex channel owned by the manager.
pub trait Link: Send + 'static {
    /// Current link state.
    fn state(&self) -> LinkState;

    /// Send a message. Only valid while the link is open.
    fn send(&mut self, message: &Message) -> Result<()>;

    /// Request a graceful shutdown. A `Close` event follows.
    fn close(&mut self, frame: CloseFrame);
}

/// Factory for links to an endpoint.
pub trait Connector: Send + Sync + 'static {
    /// The link type this connector produces.
    type Link: Link;

    /// Start opening a link to `endpoint`. Must not block.
    fn open(&self, endpoint: &str, events: EventSender) -> Self::Link;
}
