//! Fixed-period ticker that can be armed and disarmed.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::trace;

/// A repeating timer with a fixed period.
///
/// Created disarmed. Ticks are scheduled from the moment the previous tick
/// was observed, so a stalled consumer gets one late tick rather than a
/// burst of catch-up ticks.
#[derive(Debug)]
pub struct Interval {
    period: Duration,
    next: Option<Instant>,
    ticks: u64,
}

impl Interval {
    /// Creates a disarmed interval.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: None,
            ticks: 0,
        }
    }

    /// Schedules the first tick one period from now.
    pub fn arm(&mut self) {
        self.next = Some(Instant::now() + self.period);
    }

    /// Like [`arm`](Self::arm), but delays the first tick by a random
    /// `0..max_jitter` so clients started together drift apart.
    pub fn arm_with_jitter(&mut self, max_jitter: Duration) {
        let jitter = if max_jitter.is_zero() {
            Duration::ZERO
        } else {
            let us = rand::rng().random_range(0..max_jitter.as_micros() as u64);
            Duration::from_micros(us)
        };
        self.next = Some(Instant::now() + self.period + jitter);
    }

    /// Stops ticking until armed again. Idempotent.
    pub fn disarm(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// Waits for the next tick and returns the running tick count.
    ///
    /// Pends forever while disarmed. Dropping the future before it
    /// resolves leaves the schedule untouched.
    pub async fn tick(&mut self) -> u64 {
        let Some(next) = self.next else {
            std::future::pending::<()>().await;
            unreachable!()
        };
        time::sleep_until(next).await;

        self.ticks += 1;
        self.next = Some(Instant::now() + self.period);
        trace!(ticks = self.ticks, period_ms = self.period.as_millis() as u64, "interval tick");
        self.ticks
    }

    /// Total ticks observed since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
