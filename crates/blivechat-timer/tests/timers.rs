//! Integration tests for the connection timers.
//!
//! Uses `start_paused = true` so Tokio's clock only moves when every task
//! is idle, which makes `sleep_until` resolve instantly and exactly.

use std::time::Duration;

use blivechat_timer::{visibility, Backoff, BackoffConfig, Interval, VisibilityGate, Watchdog};
use proptest::prelude::*;
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

fn backoff_no_jitter() -> Backoff {
    Backoff::new(BackoffConfig::default().without_jitter())
}

// =========================================================================
// Interval
// =========================================================================

#[test]
fn test_interval_starts_disarmed() {
    let i = Interval::new(Duration::from_secs(10));
    assert!(!i.is_armed());
    assert_eq!(i.ticks(), 0);
    assert_eq!(i.period(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_interval_ticks_at_period() {
    let mut i = Interval::new(Duration::from_secs(10));
    let start = Instant::now();
    i.arm();

    assert_eq!(i.tick().await, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(i.tick().await, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_interval_pends() {
    let mut i = Interval::new(Duration::from_millis(50));
    let result = tokio::time::timeout(Duration::from_secs(5), i.tick()).await;
    assert!(result.is_err(), "disarmed interval should pend");
}

#[tokio::test(start_paused = true)]
async fn test_interval_disarm_after_arm() {
    let mut i = Interval::new(Duration::from_millis(50));
    i.arm();
    i.tick().await;
    i.disarm();
    assert!(!i.is_armed());
    let result = tokio::time::timeout(Duration::from_secs(1), i.tick()).await;
    assert!(result.is_err());
    assert_eq!(i.ticks(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_jitter_bounded() {
    let mut i = Interval::new(Duration::from_millis(100));
    let start = Instant::now();
    i.arm_with_jitter(Duration::from_millis(20));
    i.tick().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(120));
}

// =========================================================================
// Watchdog
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_watchdog_fires_after_timeout() {
    let mut w = Watchdog::new(Duration::from_secs(15));
    let start = Instant::now();
    w.reset();
    w.expired().await;
    assert_eq!(start.elapsed(), Duration::from_secs(15));
    assert!(!w.is_armed(), "fired watchdog disarms itself");
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_reset_pushes_deadline() {
    let mut w = Watchdog::new(Duration::from_secs(15));
    let start = Instant::now();
    w.reset();
    tokio::time::sleep(Duration::from_secs(10)).await;
    w.reset();
    w.expired().await;
    assert_eq!(start.elapsed(), Duration::from_secs(25));
    assert_eq!(w.resets(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disarmed_watchdog_never_fires() {
    let mut w = Watchdog::new(Duration::from_millis(10));
    w.reset();
    w.disarm();
    let result = tokio::time::timeout(Duration::from_secs(1), w.expired()).await;
    assert!(result.is_err());
}

// =========================================================================
// Backoff
// =========================================================================

#[test]
fn test_backoff_schedule() {
    let b = backoff_no_jitter();
    assert_eq!(b.base_delay(1), Duration::from_secs(1));
    assert_eq!(b.base_delay(2), Duration::from_secs(3));
    assert_eq!(b.base_delay(5), Duration::from_secs(9));
    assert_eq!(b.base_delay(10), Duration::from_secs(19));
    assert_eq!(b.base_delay(11), Duration::from_secs(20));
    assert_eq!(b.base_delay(30), Duration::from_secs(20));
}

#[test]
fn test_backoff_attempt_zero_is_base() {
    assert_eq!(backoff_no_jitter().base_delay(0), Duration::from_secs(1));
}

#[test]
fn test_backoff_without_jitter_is_exact() {
    let b = backoff_no_jitter();
    assert_eq!(b.delay(3), b.base_delay(3));
}

#[test]
fn test_backoff_jitter_bounded() {
    let b = Backoff::default();
    for n in 1..=30 {
        let d = b.delay(n);
        assert!(d >= b.base_delay(n));
        assert!(d < b.base_delay(n) + Duration::from_secs(3));
    }
}

#[test]
fn test_backoff_validated_raises_max() {
    let cfg = BackoffConfig {
        base_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(1),
        ..BackoffConfig::default()
    }
    .validated();
    assert_eq!(cfg.max_delay, Duration::from_secs(5));
}

proptest! {
    #[test]
    fn prop_backoff_monotonic_and_bounded(n in 1u32..=30) {
        let b = backoff_no_jitter();
        prop_assert!(b.base_delay(n) <= b.base_delay(n + 1));
        prop_assert!(b.base_delay(n) <= b.config().max_delay);
    }
}

// =========================================================================
// Visibility
// =========================================================================

#[test]
fn test_default_gate_is_visible() {
    assert!(VisibilityGate::default().is_visible());
}

#[tokio::test(start_paused = true)]
async fn test_gate_waits_until_visible() {
    let (handle, mut gate) = visibility();
    handle.set_visible(false);
    assert!(!gate.is_visible());

    let waiter = tokio::spawn(async move {
        gate.wait_visible().await;
        Instant::now()
    });

    tokio::time::sleep(Duration::from_secs(30)).await;
    let before = Instant::now();
    handle.set_visible(true);
    let woke_at = waiter.await.unwrap();
    assert!(woke_at >= before);
}

#[tokio::test]
async fn test_gate_with_dropped_handle_does_not_block() {
    let (handle, mut gate) = visibility();
    drop(handle);
    gate.wait_visible().await;
}
