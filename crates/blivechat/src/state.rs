//! Connection lifecycle state and the statistics snapshot clients publish.

use std::fmt;

// ---------------------------------------------------------------------------
// LinkState
// ---------------------------------------------------------------------------

/// Where a client is in its connection lifecycle.
///
/// ```text
/// Idle → Connecting → Authenticating → Live → Closing → ReconnectPending → Connecting
///                                                      ↘ Terminated
/// ```
///
/// - **Idle**: created, not started yet.
/// - **Connecting**: bootstrapping the room if needed, then opening the
///   socket.
/// - **Authenticating**: socket open, auth frame sent, waiting for the
///   reply.
/// - **Live**: authenticated; heartbeats flow and messages are delivered.
/// - **Closing**: the socket is gone (closed, timed out or discarded);
///   timers are being cleared.
/// - **ReconnectPending**: sleeping out the backoff, or waiting for the
///   host to become visible.
/// - **Terminated**: stopped by the caller or by a fatal error. Final.
///
/// Any state except `Terminated` may jump straight to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    #[default]
    Idle,
    Connecting,
    Authenticating,
    Live,
    Closing,
    ReconnectPending,
    Terminated,
}

impl LinkState {
    /// Returns `true` while a socket is open.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Authenticating | Self::Live)
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Returns `true` if moving to `target` follows the lifecycle.
    ///
    /// A failed connect attempt goes `Connecting → Closing`; a relay
    /// socket has no auth step and goes `Connecting → Live`.
    pub fn can_transition_to(self, target: Self) -> bool {
        use LinkState::*;
        match (self, target) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, Connecting) => true,
            (Connecting, Authenticating | Live | Closing) => true,
            (Authenticating, Live | Closing) => true,
            (Live, Closing) => true,
            (Closing, ReconnectPending) => true,
            (ReconnectPending, Connecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Live => write!(f, "Live"),
            Self::Closing => write!(f, "Closing"),
            Self::ReconnectPending => write!(f, "ReconnectPending"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientStats
// ---------------------------------------------------------------------------

/// A snapshot of a client's counters, published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub state: LinkState,
    /// Reconnects since the last business message. Selects the endpoint.
    pub retry_count: u32,
    /// Reconnects over the client's lifetime. Drives backoff and the
    /// retry ceiling.
    pub total_retry_count: u32,
    pub connections_opened: u64,
    pub reconnects_scheduled: u64,
    pub watchdog_resets: u64,
    pub messages_delivered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use LinkState::*;
        let path = [
            Idle,
            Connecting,
            Authenticating,
            Live,
            Closing,
            ReconnectPending,
            Connecting,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} → {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminated_is_final_and_reachable() {
        use LinkState::*;
        for state in [Idle, Connecting, Authenticating, Live, Closing, ReconnectPending] {
            assert!(state.can_transition_to(Terminated));
            assert!(!Terminated.can_transition_to(state));
        }
    }

    #[test]
    fn test_no_skipping_auth() {
        assert!(!LinkState::Idle.can_transition_to(LinkState::Live));
        assert!(!LinkState::Live.can_transition_to(LinkState::Connecting));
    }

    #[test]
    fn test_state_helpers() {
        assert!(LinkState::Live.is_connected());
        assert!(!LinkState::ReconnectPending.is_connected());
        assert!(LinkState::Terminated.is_terminated());
        assert_eq!(LinkState::default(), LinkState::Idle);
    }
}
