//! Configuration for the HTTP collaborators.

use std::time::Duration;

/// Where and how the client talks to the backend HTTP API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URLs tried in order, e.g. `http://localhost:12450`. Paths such
    /// as `/api/room_info` are appended to them.
    ///
    /// Default: a single local backend.
    pub base_urls: Vec<String>,

    /// Per-request timeout. Default: 10 seconds.
    pub request_timeout: Duration,

    /// Consecutive failures after which an endpoint is skipped.
    /// Default: 3.
    pub breaker_threshold: u32,

    /// How long a tripped endpoint is skipped before it gets one trial
    /// request. Default: 30 seconds.
    pub breaker_cooldown: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_urls: vec!["http://localhost:12450".to_owned()],
            request_timeout: Duration::from_secs(10),
            breaker_threshold: 3,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_urls = vec![url.into()];
        self
    }

    /// Clamps out-of-range values and normalizes URLs.
    ///
    /// Trailing slashes are stripped so paths can be appended directly;
    /// a zero threshold becomes 1 and a zero timeout becomes the default.
    pub fn validated(mut self) -> Self {
        for url in &mut self.base_urls {
            while url.ends_with('/') {
                url.pop();
            }
        }
        self.base_urls.retain(|url| !url.is_empty());
        if self.breaker_threshold == 0 {
            tracing::warn!("breaker_threshold 0 is invalid, using 1");
            self.breaker_threshold = 1;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = Self::default().request_timeout;
        }
        self
    }
}
