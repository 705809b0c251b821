//! Receive-timeout watchdog.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::trace;

/// A one-shot deadline that is pushed back by every [`reset`](Self::reset).
///
/// After firing it disarms itself; the owner decides whether to re-arm.
#[derive(Debug)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
    resets: u64,
}

impl Watchdog {
    /// Creates a disarmed watchdog.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            resets: 0,
        }
    }

    /// Arms (or re-arms) the deadline `timeout` from now.
    pub fn reset(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
        self.resets += 1;
        trace!(resets = self.resets, "watchdog reset");
    }

    /// Cancels the deadline. Idempotent.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the deadline passes without a reset.
    ///
    /// Pends forever while disarmed.
    pub async fn expired(&mut self) {
        let Some(deadline) = self.deadline else {
            std::future::pending::<()>().await;
            unreachable!()
        };
        time::sleep_until(deadline).await;
        self.deadline = None;
    }

    /// How many times the deadline was (re)armed.
    pub fn resets(&self) -> u64 {
        self.resets
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
