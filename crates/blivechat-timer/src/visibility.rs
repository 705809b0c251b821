//! Foreground/background signal from the host.
//!
//! Timers in a backgrounded host are throttled, so a reconnect attempted
//! there would most likely time out straight away. The host flips a
//! [`VisibilityHandle`]; the client holds reconnects on the matching
//! [`VisibilityGate`] until it reads visible again.

use tokio::sync::watch;
use tracing::debug;

/// Creates a linked handle and gate, starting visible.
pub fn visibility() -> (VisibilityHandle, VisibilityGate) {
    let (tx, rx) = watch::channel(true);
    (VisibilityHandle { tx }, VisibilityGate { rx })
}

/// Host-side switch.
#[derive(Debug)]
pub struct VisibilityHandle {
    tx: watch::Sender<bool>,
}

impl VisibilityHandle {
    /// Reports whether the host is currently in the foreground.
    pub fn set_visible(&self, visible: bool) {
        let changed = self.tx.send_if_modified(|v| {
            let changed = *v != visible;
            *v = visible;
            changed
        });
        if changed {
            debug!(visible, "host visibility changed");
        }
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Client-side view. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    rx: watch::Receiver<bool>,
}

impl Default for VisibilityGate {
    /// A gate with no host behind it; always visible.
    fn default() -> Self {
        let (_, gate) = visibility();
        gate
    }
}

impl VisibilityGate {
    pub fn is_visible(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns once the host is visible.
    ///
    /// Resolves immediately if it already is, or if the handle was dropped
    /// (nobody is left to report background state).
    pub async fn wait_visible(&mut self) {
        let _ = self.rx.wait_for(|visible| *visible).await;
    }
}
