//! Observer callbacks invoked by the connection driver.
//!
//! Callbacks run on the driver task, one at a time, in the order the
//! underlying events happened. They only observe: nothing they do feeds
//! back into reconnect or heartbeat decisions. A callback that blocks
//! stalls the whole manager, so hand heavy work off to another task.

use std::time::Duration;

use crate::message::Message;
use crate::types::CloseFrame;

type OpenFn = Box<dyn FnMut() + Send>;
type MessageFn = Box<dyn FnMut(&Message) + Send>;
type CloseFn = Box<dyn FnMut(&CloseFrame) + Send>;
type ErrorFn = Box<dyn FnMut(&str) + Send>;
type ReconnectFn = Box<dyn FnMut(u32, Duration) + Send>;
type GiveUpFn = Box<dyn FnMut(u32) + Send>;

/// Set of optional lifecycle callbacks.
///
/// # Example
///
/// ```
/// use resocket::EventHandlers;
///
/// let handlers = EventHandlers::new()
///     .on_open(|| println!("connected"))
///     .on_message(|msg| println!("received {} bytes", msg.len()))
///     .on_give_up(|attempts| eprintln!("giving up after {attempts} attempts"));
/// ```
#[derive(Default)]
pub struct EventHandlers {
    on_open: Option<OpenFn>,
    on_message: Option<MessageFn>,
    on_close: Option<CloseFn>,
    on_error: Option<ErrorFn>,
    on_reconnect: Option<ReconnectFn>,
    on_give_up: Option<GiveUpFn>,
}

impl EventHandlers {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called every time a link opens.
    pub fn on_open(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called for every application message. Heartbeats are filtered out.
    pub fn on_message(mut self, f: impl FnMut(&Message) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called every time a link closes, clean or not.
    pub fn on_close(mut self, f: impl FnMut(&CloseFrame) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Called for transport errors. Errors alone never trigger a reconnect.
    pub fn on_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called when a reconnect is scheduled, with the 1-based attempt
    /// number and the backoff delay before it.
    pub fn on_reconnect(mut self, f: impl FnMut(u32, Duration) + Send + 'static) -> Self {
        self.on_reconnect = Some(Box::new(f));
        self
    }

    /// Called once the reconnect budget is exhausted and the manager stops
    /// retrying, with the number of attempts made.
    pub fn on_give_up(mut self, f: impl FnMut(u32) + Send + 'static) -> Self {
        self.on_give_up = Some(Box::new(f));
        self
    }

    pub(crate) fn emit_open(&mut self) {
        if let Some(f) = self.on_open.as_mut() {
            f();
        }
    }

    pub(crate) fn emit_message(&mut self, message: &Message) {
        if let Some(f) = self.on_message.as_mut() {
            f(message);
        }
    }

    pub(crate) fn emit_close(&mut self, frame: &CloseFrame) {
        if let Some(f) = self.on_close.as_mut() {
            f(frame);
        }
    }

    pub(crate) fn emit_error(&mut self, detail: &str) {
        if let Some(f) = self.on_error.as_mut() {
            f(detail);
        }
    }

    pub(crate) fn emit_reconnect(&mut self, attempt: u32, delay: Duration) {
        if let Some(f) = self.on_reconnect.as_mut() {
            f(attempt, delay);
        }
    }

    pub(crate) fn emit_give_up(&mut self, attempts: u32) {
        if let Some(f) = self.on_give_up.as_mut() {
            f(attempts);
        }
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_open", &self.on_open.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_give_up", &self.on_give_up.is_some())
            .finish()
    }
}
