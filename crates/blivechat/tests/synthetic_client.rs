//! The synthetic client on a paused clock.

use std::collections::HashMap;
use std::time::Duration;

use blivechat::prelude::*;
use tokio::time::Instant;

fn seeded(seed: u64) -> SyntheticConfig {
    SyntheticConfig {
        seed: Some(seed),
        ..SyntheticConfig::default()
    }
}

// =========================================================================
// Cadence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cadence_over_a_minute() {
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().synthetic(seeded(1), handler);
    let start = Instant::now();
    let mut last = start;
    let mut count = 0;

    while start.elapsed() < Duration::from_secs(60) {
        let msg = rx.recv().await.expect("client keeps running");
        assert!(!matches!(msg, ChatMessage::Fatal(_)));
        assert!(last.elapsed() <= Duration::from_secs(2), "gap too long");
        last = Instant::now();
        count += 1;
    }
    // Mean gap is 0.8 × 200 ms + 0.2 × 1.5 s = 460 ms, so about 130.
    assert!((80..=200).contains(&count), "count: {count}");
    assert_eq!(client.stats().state, LinkState::Live);

    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_kinds() {
    async fn kinds(seed: u64) -> Vec<&'static str> {
        let (handler, mut rx) = channel_handler();
        let client = ChatClient::builder().synthetic(seeded(seed), handler);
        let mut out = Vec::new();
        for _ in 0..50 {
            out.push(rx.recv().await.unwrap().kind());
        }
        client.stop();
        client.join().await.unwrap();
        out
    }
    assert_eq!(kinds(9).await, kinds(9).await);
}

// =========================================================================
// Follow-ups
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_translations_follow_their_text() {
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().synthetic(
        SyntheticConfig {
            translation_probability: 1.0,
            ..seeded(3)
        },
        handler,
    );

    let mut pending: HashMap<String, Instant> = HashMap::new();
    let mut translated = 0;
    while translated < 10 {
        match rx.recv().await.unwrap() {
            ChatMessage::AddText(text) if text.emoticon_image_url.is_none() => {
                pending.insert(text.id, Instant::now());
            }
            ChatMessage::UpdateTranslation(update) => {
                let sent = pending.remove(&update.id).expect("translation of a known text");
                let delay = sent.elapsed();
                assert!(delay >= Duration::from_secs(1), "{delay:?}");
                assert!(delay <= Duration::from_secs(5), "{delay:?}");
                assert!(!update.translation.is_empty());
                translated += 1;
            }
            _ => {}
        }
    }
    client.stop();
    client.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stop_does_not_wait_for_followups() {
    let (handler, mut rx) = channel_handler();
    let client = ChatClient::builder().synthetic(
        SyntheticConfig {
            deletion_probability: 1.0,
            ..seeded(4)
        },
        handler,
    );
    while !matches!(rx.recv().await, Some(ChatMessage::AddSuperChat(_))) {}

    let stopped_at = Instant::now();
    client.stop();
    let stats = client.watch_stats();
    client.join().await.unwrap();
    assert_eq!(stopped_at.elapsed(), Duration::ZERO);
    assert_eq!(stats.borrow().state, LinkState::Terminated);
    // The deletion was still pending.
    while let Some(msg) = rx.recv().await {
        assert!(!matches!(msg, ChatMessage::DelSuperChat(_)));
    }
}
