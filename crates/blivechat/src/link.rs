//! State every client task carries: the stop signal, the visibility gate,
//! the message handler and the published statistics.
//!
//! The binary-protocol driver, the relay client and the synthetic client
//! differ in what they read from the wire, but not in how they stop,
//! count retries, give up or deliver messages. That common part lives
//! here.

use std::time::Duration;

use blivechat_command::{dispatch, ChatMessage, FatalError, FatalErrorKind, MessageHandler};
use blivechat_timer::VisibilityGate;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::{ClientStats, LinkState};

/// Outcome of the close path.
#[derive(Debug)]
pub(crate) enum CloseVerdict {
    /// `stop()` was requested; do not reconnect.
    Stopped,
    /// The retry ceiling was crossed.
    GiveUp(FatalError),
    Retry,
}

pub(crate) struct Link<H> {
    name: &'static str,
    shutdown: watch::Receiver<bool>,
    visibility: VisibilityGate,
    stats_tx: watch::Sender<ClientStats>,
    pub(crate) stats: ClientStats,
    handler: H,
    fatal_delivered: bool,
}

impl<H: MessageHandler> Link<H> {
    pub(crate) fn new(
        name: &'static str,
        shutdown: watch::Receiver<bool>,
        visibility: VisibilityGate,
        stats_tx: watch::Sender<ClientStats>,
        handler: H,
    ) -> Self {
        Self {
            name,
            shutdown,
            visibility,
            stats_tx,
            stats: ClientStats::default(),
            handler,
            fatal_delivered: false,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    // -----------------------------------------------------------------------
    // Stop signal
    // -----------------------------------------------------------------------

    /// `stop()` was called, or the handle is gone.
    pub(crate) fn is_stopping(&self) -> bool {
        *self.shutdown.borrow() || self.shutdown.has_changed().is_err()
    }

    /// Resolves once stopping. Cancel-safe.
    pub(crate) async fn stopped(&mut self) {
        loop {
            if *self.shutdown.borrow_and_update() {
                return;
            }
            if self.shutdown.changed().await.is_err() {
                return;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub(crate) fn publish(&self) {
        self.stats_tx.send_replace(self.stats.clone());
    }

    pub(crate) fn set_state(&mut self, next: LinkState) {
        let current = self.stats.state;
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(client = self.name, from = %current, to = %next, "unexpected state transition");
        }
        debug!(client = self.name, from = %current, to = %next, "state");
        self.stats.state = next;
        self.publish();
    }

    pub(crate) fn count_watchdog_reset(&mut self) {
        self.stats.watchdog_resets += 1;
    }

    /// A business message arrived, so the current endpoint works.
    pub(crate) fn reset_retry_count(&mut self) {
        self.stats.retry_count = 0;
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    pub(crate) fn deliver(&mut self, msg: ChatMessage) {
        if let ChatMessage::Fatal(fatal) = msg {
            self.deliver_fatal(fatal);
            return;
        }
        self.stats.messages_delivered += 1;
        dispatch(&mut self.handler, msg);
    }

    /// Hands `fatal` to the handler unless one was already delivered.
    pub(crate) fn deliver_fatal(&mut self, fatal: FatalError) {
        if self.fatal_delivered {
            debug!(client = self.name, error = %fatal, "suppressing second fatal error");
            return;
        }
        error!(client = self.name, error = %fatal, "fatal error, giving up");
        self.fatal_delivered = true;
        self.stats.messages_delivered += 1;
        dispatch(&mut self.handler, ChatMessage::Fatal(fatal));
        self.publish();
    }

    // -----------------------------------------------------------------------
    // Close path
    // -----------------------------------------------------------------------

    /// Counts a lost connection and decides whether to try again.
    pub(crate) fn record_close(&mut self, max_total_retries: u32) -> CloseVerdict {
        self.set_state(LinkState::Closing);
        if self.is_stopping() {
            return CloseVerdict::Stopped;
        }
        self.stats.retry_count += 1;
        self.stats.total_retry_count += 1;
        self.publish();
        if self.stats.total_retry_count > max_total_retries {
            return CloseVerdict::GiveUp(FatalError::new(
                FatalErrorKind::TooManyRetries,
                format!("gave up after {} reconnect attempts", max_total_retries),
            ));
        }
        CloseVerdict::Retry
    }

    /// Enters `ReconnectPending` and logs the upcoming delay.
    pub(crate) fn begin_reconnect(&mut self, delay: Duration) {
        self.set_state(LinkState::ReconnectPending);
        self.stats.reconnects_scheduled += 1;
        self.publish();
        warn!(
            client = self.name,
            retry_count = self.stats.retry_count,
            total_retry_count = self.stats.total_retry_count,
            delay_ms = delay.as_millis() as u64,
            "connection lost, reconnecting"
        );
    }

    /// A gate to wait on when the host is hidden, or `None` if it is
    /// visible now.
    pub(crate) fn hidden_gate(&self) -> Option<VisibilityGate> {
        if self.visibility.is_visible() {
            return None;
        }
        info!(client = self.name, "host hidden, deferring reconnect");
        Some(self.visibility.clone())
    }

    /// Sleeps out `delay`, then waits for the host to be visible.
    ///
    /// Returns `false` if stopped meanwhile.
    pub(crate) async fn wait_reconnect(&mut self, delay: Duration) -> bool {
        self.begin_reconnect(delay);
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.stopped() => return false,
        }
        if let Some(mut gate) = self.hidden_gate() {
            tokio::select! {
                () = gate.wait_visible() => {}
                () = self.stopped() => return false,
            }
        }
        !self.is_stopping()
    }

    pub(crate) fn terminate(&mut self) {
        self.set_state(LinkState::Terminated);
        info!(client = self.name, "client terminated");
    }
}
