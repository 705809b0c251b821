//! Open-platform game sessions.
//!
//! The open platform authorizes a chat connection through a "game": an
//! application-level session, separate from the socket, that is started
//! with the room owner's auth code, kept alive by periodic heartbeat calls
//! and ended explicitly. A game can expire while the socket is still
//! healthy, in which case the socket is useless and both must be rebuilt.

use std::time::Duration;

use crate::{ApiStatus, SessionError, StartGameResponse};

/// `start_game`: the auth code is wrong. Fatal.
pub const CODE_AUTH_CODE_INVALID: i64 = 7007;

/// `end_game`: the game was already closed.
pub const CODE_GAME_ALREADY_ENDED: i64 = 7000;

/// `game_heartbeat`/`end_game`: the game expired, usually because
/// heartbeats stopped arriving in time.
pub const CODE_GAME_EXPIRED: i64 = 7003;

/// Interval between game heartbeats.
pub const DEFAULT_GAME_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// Everything a successful `start_game` yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Empty when the platform issued no game, in which case no
    /// heartbeats are needed.
    pub game_id: String,
    /// Sent verbatim as the auth frame body.
    pub auth_body: String,
    /// Candidate socket URLs, tried round-robin.
    pub wss_links: Vec<String>,
    /// Open id of the anchor, or their numeric uid on older backends.
    pub anchor_uid: String,
    pub room_id: u64,
}

impl GameSession {
    /// Interprets a `start_game` response.
    ///
    /// # Errors
    /// - [`SessionError::AuthCodeInvalid`] for code 7007 (fatal)
    /// - [`SessionError::Api`] for any other non-zero code
    /// - [`SessionError::MalformedResponse`] when `data` is missing or
    ///   lists no socket URL
    pub fn from_start_response(res: StartGameResponse) -> Result<Self, SessionError> {
        let status = res.status;
        match status.code {
            0 => {}
            CODE_AUTH_CODE_INVALID => {
                return Err(SessionError::AuthCodeInvalid(describe(&status)));
            }
            code => {
                return Err(SessionError::Api {
                    code,
                    message: describe(&status),
                });
            }
        }
        let data = res.data.ok_or(SessionError::MalformedResponse("data"))?;
        if data.websocket_info.wss_link.is_empty() {
            return Err(SessionError::MalformedResponse("websocket_info.wss_link"));
        }
        let anchor = data.anchor_info;
        let anchor_uid = if !anchor.open_id.is_empty() {
            anchor.open_id
        } else if anchor.uid != 0 {
            anchor.uid.to_string()
        } else {
            String::new()
        };
        Ok(Self {
            game_id: data.game_info.game_id,
            auth_body: data.websocket_info.auth_body,
            wss_links: data.websocket_info.wss_link,
            anchor_uid,
            room_id: anchor.room_id,
        })
    }

    pub fn needs_heartbeat(&self) -> bool {
        !self.game_id.is_empty()
    }
}

/// Whether an `end_game` response means the game is gone.
pub fn end_game_succeeded(status: &ApiStatus) -> bool {
    matches!(status.code, 0 | CODE_GAME_ALREADY_ENDED | CODE_GAME_EXPIRED)
}

fn describe(status: &ApiStatus) -> String {
    format!(
        "code={}, message={}, request_id={}",
        status.code, status.message, status.request_id
    )
}

// ---------------------------------------------------------------------------
// Heartbeat policy
// ---------------------------------------------------------------------------

/// When a failing game heartbeat should tear the connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameHeartbeatPolicy {
    /// Rebuild as soon as a heartbeat reports the game expired. Other
    /// failures are only logged.
    #[default]
    Immediate,

    /// Rebuild after this many consecutive failed heartbeats of any kind,
    /// expiry included.
    AfterFailures(u32),
}

/// What the client should do after a heartbeat result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    Healthy,
    /// Failed, but not enough to act on.
    Tolerated,
    /// Restart the game and reconnect the socket.
    Rebuild,
}

/// Applies a [`GameHeartbeatPolicy`] to a stream of heartbeat results.
#[derive(Debug, Clone)]
pub struct GameHeartbeatTracker {
    policy: GameHeartbeatPolicy,
    consecutive_failures: u32,
}

impl GameHeartbeatTracker {
    pub fn new(policy: GameHeartbeatPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    pub fn record(&mut self, result: &Result<ApiStatus, SessionError>) -> HeartbeatVerdict {
        let expired = match result {
            Ok(status) if status.is_ok() => {
                self.consecutive_failures = 0;
                return HeartbeatVerdict::Healthy;
            }
            Ok(status) => status.code == CODE_GAME_EXPIRED,
            Err(_) => false,
        };
        self.consecutive_failures += 1;

        let rebuild = match self.policy {
            GameHeartbeatPolicy::Immediate => expired,
            GameHeartbeatPolicy::AfterFailures(n) => self.consecutive_failures >= n.max(1),
        };
        if rebuild {
            self.consecutive_failures = 0;
            HeartbeatVerdict::Rebuild
        } else {
            HeartbeatVerdict::Tolerated
        }
    }

    /// Forgets past failures, e.g. after a new game was started.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
