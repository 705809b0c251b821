//! Client configuration.
//!
//! Every struct has a `Default` with the values the upstream services
//! expect, and a `validated()` that repairs values which would break the
//! connection loop instead of rejecting them.

use std::time::Duration;

use blivechat_session::{GameHeartbeatPolicy, RoomKey, DEFAULT_GAME_HEARTBEAT_INTERVAL};
use blivechat_timer::BackoffConfig;
use tracing::warn;

/// Reconnect ceiling shared by all network clients.
pub const DEFAULT_MAX_TOTAL_RETRIES: u32 = 30;

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Timers and retry limits of the binary-protocol clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How often a heartbeat frame is sent while connected. Default: 10 s.
    pub heartbeat_interval: Duration,
    /// Added to the heartbeat interval to get the receive timeout.
    /// Default: 5 s.
    pub receive_grace: Duration,
    /// Once the lifetime reconnect count exceeds this, the client gives up
    /// with `FatalError(TooManyRetries)`. Default: 30.
    pub max_total_retries: u32,
    pub backoff: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            receive_grace: Duration::from_secs(5),
            max_total_retries: DEFAULT_MAX_TOTAL_RETRIES,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// No frame for this long means the socket is dead.
    pub fn receive_timeout(&self) -> Duration {
        self.heartbeat_interval + self.receive_grace
    }

    /// Fixes values that would make the connection loop meaningless.
    ///
    /// - A zero heartbeat interval falls back to the default (10 s).
    pub fn validated(mut self) -> Self {
        if self.heartbeat_interval.is_zero() {
            warn!("heartbeat_interval is zero, using default");
            self.heartbeat_interval = Self::default().heartbeat_interval;
        }
        self.backoff = self.backoff.validated();
        self
    }
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// Settings for the direct web connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectWebConfig {
    /// Room to join; short ids are resolved during bootstrap.
    pub room_id: u64,
    /// Look up avatars the danmaku itself doesn't carry. Default: true.
    pub resolve_avatars: bool,
    /// Auth reply codes that end the client instead of reconnecting.
    /// Default: none.
    pub fatal_auth_codes: Vec<i64>,
}

impl DirectWebConfig {
    pub fn new(room_id: u64) -> Self {
        Self {
            room_id,
            resolve_avatars: true,
            fatal_auth_codes: Vec::new(),
        }
    }
}

/// Settings for the open-platform connection.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenLiveConfig {
    /// The room owner's identity code. Masked in `Debug` output.
    pub auth_code: String,
    pub app_id: u64,
    /// How often the game session is kept alive. Default: 20 s.
    pub game_heartbeat_interval: Duration,
    pub heartbeat_policy: GameHeartbeatPolicy,
    /// Fill in text emoticons from the backend's keyword table.
    /// Default: true.
    pub load_text_emoticons: bool,
    /// Auth reply codes that end the client instead of reconnecting.
    /// Default: none.
    pub fatal_auth_codes: Vec<i64>,
}

impl OpenLiveConfig {
    pub fn new(auth_code: impl Into<String>, app_id: u64) -> Self {
        Self {
            auth_code: auth_code.into(),
            app_id,
            game_heartbeat_interval: DEFAULT_GAME_HEARTBEAT_INTERVAL,
            heartbeat_policy: GameHeartbeatPolicy::default(),
            load_text_emoticons: true,
            fatal_auth_codes: Vec::new(),
        }
    }

    /// - A zero game heartbeat interval falls back to the default (20 s).
    pub fn validated(mut self) -> Self {
        if self.game_heartbeat_interval.is_zero() {
            warn!("game_heartbeat_interval is zero, using default");
            self.game_heartbeat_interval = DEFAULT_GAME_HEARTBEAT_INTERVAL;
        }
        self
    }
}

impl std::fmt::Debug for OpenLiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenLiveConfig")
            .field("auth_code", &blivechat_session::mask(&self.auth_code))
            .field("app_id", &self.app_id)
            .field("game_heartbeat_interval", &self.game_heartbeat_interval)
            .field("heartbeat_policy", &self.heartbeat_policy)
            .field("load_text_emoticons", &self.load_text_emoticons)
            .field("fatal_auth_codes", &self.fatal_auth_codes)
            .finish()
    }
}

/// Settings for the relay client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// WebSocket URL of the relay, e.g. `ws://localhost:12450/api/chat`.
    pub url: String,
    pub room: RoomKey,
    /// Ask the relay to translate messages server-side.
    pub auto_translate: bool,
    /// The relay heartbeats every 10 s; silence for this long means the
    /// socket is dead. Default: 15 s.
    pub receive_timeout: Duration,
    /// Default: 30.
    pub max_total_retries: u32,
    pub backoff: BackoffConfig,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>, room: RoomKey) -> Self {
        Self {
            url: url.into(),
            room,
            auto_translate: false,
            receive_timeout: Duration::from_secs(15),
            max_total_retries: DEFAULT_MAX_TOTAL_RETRIES,
            backoff: BackoffConfig::default(),
        }
    }

    /// - A zero receive timeout falls back to the default (15 s).
    pub fn validated(mut self) -> Self {
        if self.receive_timeout.is_zero() {
            warn!("receive_timeout is zero, using default");
            self.receive_timeout = Duration::from_secs(15);
        }
        self.backoff = self.backoff.validated();
        self
    }
}

/// Settings for the synthetic client.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    /// Chance that the next gap is a long pause. Default: 0.2.
    pub pause_probability: f64,
    /// Gap range for normal traffic. Default: 0–400 ms.
    pub burst_gap: (Duration, Duration),
    /// Gap range for pauses. Default: 1–2 s.
    pub pause_gap: (Duration, Duration),
    /// Chance that a text message later gets a translation. Default: 0.
    pub translation_probability: f64,
    /// Chance that a super chat is later deleted. Default: 0.
    pub deletion_probability: f64,
    /// Delay range for translations and deletions. Default: 1–5 s.
    pub followup_delay: (Duration, Duration),
    /// Fixed seed for reproducible traffic. Default: seeded from the OS.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            pause_probability: 0.2,
            burst_gap: (Duration::ZERO, Duration::from_millis(400)),
            pause_gap: (Duration::from_secs(1), Duration::from_secs(2)),
            translation_probability: 0.0,
            deletion_probability: 0.0,
            followup_delay: (Duration::from_secs(1), Duration::from_secs(5)),
            seed: None,
        }
    }
}

impl SyntheticConfig {
    /// - Probabilities are clamped to `0.0..=1.0`.
    /// - Ranges with `min > max` are swapped.
    pub fn validated(mut self) -> Self {
        for p in [
            &mut self.pause_probability,
            &mut self.translation_probability,
            &mut self.deletion_probability,
        ] {
            if !(0.0..=1.0).contains(&*p) {
                warn!(value = *p, "probability out of range, clamping");
                *p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
            }
        }
        for range in [
            &mut self.burst_gap,
            &mut self.pause_gap,
            &mut self.followup_delay,
        ] {
            if range.0 > range.1 {
                std::mem::swap(&mut range.0, &mut range.1);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.receive_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_total_retries, 30);
    }

    #[test]
    fn test_zero_heartbeat_repaired() {
        let config = ClientConfig {
            heartbeat_interval: Duration::ZERO,
            ..ClientConfig::default()
        }
        .validated();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_open_live_debug_masks_auth_code() {
        let config = OpenLiveConfig::new("SECRETXYZ", 1);
        let debug = format!("{config:?}");
        assert!(debug.contains("***XYZ"));
        assert!(!debug.contains("SECRET"));
    }

    #[test]
    fn test_synthetic_validated_clamps() {
        let config = SyntheticConfig {
            pause_probability: 1.5,
            deletion_probability: -1.0,
            burst_gap: (Duration::from_secs(2), Duration::from_secs(1)),
            ..SyntheticConfig::default()
        }
        .validated();
        assert_eq!(config.pause_probability, 1.0);
        assert_eq!(config.deletion_probability, 0.0);
        assert_eq!(
            config.burst_gap,
            (Duration::from_secs(1), Duration::from_secs(2))
        );
    }
}
