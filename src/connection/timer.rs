//! Owned, cancellable timer slots.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep_until};

/// A slot holding at most one pending timer.
///
/// Arming the slot drops (and so cancels) whatever timer it held before.
/// An empty slot never fires, which lets the driver poll every slot in the
/// same `select!` unconditionally.
#[derive(Debug, Default)]
pub(crate) struct TimerSlot {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending timer with one firing after `delay`.
    pub fn rearm(&mut self, delay: Duration) {
        self.rearm_at(Instant::now() + delay);
    }

    /// Replace the pending timer with one firing at `deadline`.
    pub fn rearm_at(&mut self, deadline: Instant) {
        match self.sleep.as_mut() {
            Some(sleep) => sleep.as_mut().reset(deadline),
            None => self.sleep = Some(Box::pin(sleep_until(deadline))),
        }
    }

    pub fn cancel(&mut self) {
        self.sleep = None;
    }

    pub fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }

    #[cfg(test)]
    pub fn deadline(&self) -> Option<Instant> {
        self.sleep.as_ref().map(|sleep| sleep.deadline())
    }

    /// Wait for the pending timer. Pends forever on an empty slot.
    ///
    /// The slot is empty again once this returns; the returned instant is
    /// the deadline that fired.
    pub async fn fired(&mut self) -> Instant {
        match self.sleep.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                let deadline = sleep.deadline();
                self.sleep = None;
                deadline
            }
            None => std::future::pending().await,
        }
    }
}
