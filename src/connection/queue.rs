//! Outbound buffering while the link is not open.

use std::collections::VecDeque;

use crate::error::{ResocketError, Result};
use crate::message::Message;

use super::config::{OverflowPolicy, QueueConfig};

/// Outcome of queueing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Enqueued {
    /// Stored without side effects.
    Stored,
    /// Stored after evicting the oldest message.
    Evicted(Message),
}

/// FIFO of messages waiting for an open link.
#[derive(Debug)]
pub(crate) struct PendingQueue {
    messages: VecDeque<Message>,
    config: QueueConfig,
}

impl PendingQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            messages: VecDeque::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append a message, applying the overflow policy when full.
    pub fn push(&mut self, message: Message) -> Result<Enqueued> {
        let Some(capacity) = self.config.capacity else {
            self.messages.push_back(message);
            return Ok(Enqueued::Stored);
        };

        if self.messages.len() < capacity {
            self.messages.push_back(message);
            return Ok(Enqueued::Stored);
        }

        match self.config.overflow {
            OverflowPolicy::Reject => Err(ResocketError::QueueFull { capacity }),
            OverflowPolicy::DropOldest => {
                let evicted = self.messages.pop_front();
                self.messages.push_back(message);
                Ok(evicted.map_or(Enqueued::Stored, Enqueued::Evicted))
            }
        }
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    /// Put back a message that could not be sent, keeping FIFO order.
    pub fn requeue(&mut self, message: Message) {
        self.messages.push_front(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
