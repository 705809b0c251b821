//! Endpoint selection with per-endpoint circuit breakers.
//!
//! The backend may be reachable at several base URLs. Each one has a
//! breaker that trips after a run of consecutive failures, so a dead
//! endpoint stops costing a full request timeout on every call:
//!
//! ```text
//!   Closed ──(threshold failures)──→ Open ──(cooldown)──→ HalfOpen
//!     ↑                                ↑                     │
//!     └──────────(success)─────────────┼─────────────────────┤
//!                                      └──────(failure)──────┘
//! ```
//!
//! A half-open endpoint gets exactly one trial request: success closes
//! it, failure reopens it for another cooldown.
//!
//! Not thread-safe by itself; the HTTP client wraps it in a mutex and
//! never holds the lock across an `.await`.

use std::time::Duration;

use tokio::time::Instant;

// ---------------------------------------------------------------------------
// BreakerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Healthy. `failures` counts consecutive failures so far.
    Closed { failures: u32 },

    /// Tripped; skipped until `until`.
    Open { until: Instant },

    /// Cooldown elapsed; the next request is a trial.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    state: BreakerState,
}

// ---------------------------------------------------------------------------
// EndpointSelector
// ---------------------------------------------------------------------------

/// Picks the first usable endpoint from an ordered list.
#[derive(Debug, Clone)]
pub struct EndpointSelector {
    endpoints: Vec<Endpoint>,
    threshold: u32,
    cooldown: Duration,
}

impl EndpointSelector {
    pub fn new(
        urls: impl IntoIterator<Item = impl Into<String>>,
        threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            endpoints: urls
                .into_iter()
                .map(|url| Endpoint {
                    url: url.into(),
                    state: BreakerState::Closed { failures: 0 },
                })
                .collect(),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    /// Returns the first endpoint whose breaker lets a request through,
    /// moving cooled-down endpoints to half-open on the way.
    ///
    /// Returns `None` when every breaker is open.
    pub fn select(&mut self) -> Option<String> {
        let now = Instant::now();
        for endpoint in &mut self.endpoints {
            match endpoint.state {
                BreakerState::Closed { .. } | BreakerState::HalfOpen => {
                    return Some(endpoint.url.clone());
                }
                BreakerState::Open { until } if now >= until => {
                    tracing::debug!(url = %endpoint.url, "endpoint half-open, allowing trial");
                    endpoint.state = BreakerState::HalfOpen;
                    return Some(endpoint.url.clone());
                }
                BreakerState::Open { .. } => {}
            }
        }
        None
    }

    /// Records a successful request, closing the breaker.
    pub fn report_success(&mut self, url: &str) {
        if let Some(endpoint) = self.find_mut(url) {
            if endpoint.state != (BreakerState::Closed { failures: 0 }) {
                tracing::debug!(url, "endpoint recovered");
            }
            endpoint.state = BreakerState::Closed { failures: 0 };
        }
    }

    /// Records a failed request, tripping the breaker at the threshold or
    /// immediately when the failure was a half-open trial.
    pub fn report_failure(&mut self, url: &str) {
        let threshold = self.threshold;
        let until = Instant::now() + self.cooldown;
        let Some(endpoint) = self.find_mut(url) else {
            return;
        };
        endpoint.state = match endpoint.state {
            BreakerState::Closed { failures } if failures + 1 < threshold => {
                BreakerState::Closed {
                    failures: failures + 1,
                }
            }
            BreakerState::Closed { .. } | BreakerState::HalfOpen => {
                tracing::warn!(url, "endpoint circuit opened");
                BreakerState::Open { until }
            }
            // Late report from a request started before the trip.
            open @ BreakerState::Open { .. } => open,
        };
    }

    pub fn state(&self, url: &str) -> Option<BreakerState> {
        self.endpoints
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.state)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn find_mut(&mut self, url: &str) -> Option<&mut Endpoint> {
        self.endpoints.iter_mut().find(|e| e.url == url)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Cooldowns are driven by tokio's paused clock, so `advance` moves
    //! time forward instantly and deterministically.

    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(30);

    fn selector() -> EndpointSelector {
        EndpointSelector::new(["http://a", "http://b"], 2, COOLDOWN)
    }

    // =====================================================================
    // select()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_select_prefers_first_healthy() {
        let mut s = selector();
        assert_eq!(s.select().as_deref(), Some("http://a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_skips_tripped_endpoint() {
        let mut s = selector();
        s.report_failure("http://a");
        assert_eq!(s.select().as_deref(), Some("http://a"), "below threshold");
        s.report_failure("http://a");
        assert!(matches!(s.state("http://a"), Some(BreakerState::Open { .. })));
        assert_eq!(s.select().as_deref(), Some("http://b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_none_when_all_open() {
        let mut s = EndpointSelector::new(["http://a"], 1, COOLDOWN);
        s.report_failure("http://a");
        assert_eq!(s.select(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_selector() {
        let mut s = EndpointSelector::new(Vec::<String>::new(), 1, COOLDOWN);
        assert!(s.is_empty());
        assert_eq!(s.select(), None);
    }

    // =====================================================================
    // Half-open trials
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_moves_to_half_open() {
        let mut s = EndpointSelector::new(["http://a"], 1, COOLDOWN);
        s.report_failure("http://a");
        tokio::time::advance(COOLDOWN).await;
        assert_eq!(s.select().as_deref(), Some("http://a"));
        assert_eq!(s.state("http://a"), Some(BreakerState::HalfOpen));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes() {
        let mut s = EndpointSelector::new(["http://a"], 3, COOLDOWN);
        for _ in 0..3 {
            s.report_failure("http://a");
        }
        tokio::time::advance(COOLDOWN).await;
        s.select();
        s.report_success("http://a");
        assert_eq!(
            s.state("http://a"),
            Some(BreakerState::Closed { failures: 0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_immediately() {
        let mut s = EndpointSelector::new(["http://a"], 3, COOLDOWN);
        for _ in 0..3 {
            s.report_failure("http://a");
        }
        tokio::time::advance(COOLDOWN).await;
        s.select();
        s.report_failure("http://a");
        assert!(matches!(s.state("http://a"), Some(BreakerState::Open { .. })));
        assert_eq!(s.select(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_count() {
        let mut s = selector();
        s.report_failure("http://a");
        s.report_success("http://a");
        s.report_failure("http://a");
        assert_eq!(
            s.state("http://a"),
            Some(BreakerState::Closed { failures: 1 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_url_reports_ignored() {
        let mut s = selector();
        s.report_failure("http://elsewhere");
        s.report_success("http://elsewhere");
        assert_eq!(s.len(), 2);
        assert_eq!(s.state("http://elsewhere"), None);
    }
}
