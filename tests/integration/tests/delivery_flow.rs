//! End-to-end delivery tests.
//!
//! These tests drive the engine through the in-memory platform with a
//! file-backed avatar index, checking what actually reaches the platform.

use personacast_core::types::{ChannelRef, Embed};
use personacast_delivery::{
    DeliverOptions, DeliveryDisposition, DeliveryError, DeliverySettings, MemoryPlatform,
};
use personacast_integration_tests::{
    aria, png_bytes, Harness, ARIA_AVATAR, FALLBACK_AVATAR, PUBLIC_BASE,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_single_delivery_as_persona() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    let result = harness
        .engine
        .deliver(&channel, "Hello there.", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();

    assert!(!result.is_duplicate);
    assert_eq!(result.all_message_ids.len(), 1);
    assert_eq!(result.first_message_id, result.all_message_ids[0]);

    let sent = harness.platform.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload.content, "Hello there.");
    assert_eq!(sent[0].payload.username, "Aria");
    assert!(sent[0].payload.avatar_url.starts_with(PUBLIC_BASE));
}

#[tokio::test(start_paused = true)]
async fn test_immediate_repeat_sends_once() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    let first = harness
        .engine
        .deliver(&channel, "Hello there.", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    let second = harness
        .engine
        .deliver(&channel, "Hello there.", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();

    assert!(!first.is_duplicate);
    assert!(second.is_duplicate);
    assert_eq!(second.disposition, DeliveryDisposition::Duplicate);
    assert_eq!(harness.platform.send_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_window_boundaries() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");
    let persona = aria();
    let deliver = || {
        harness
            .engine
            .deliver(&channel, "Same words", Some(&persona), DeliverOptions::default())
    };

    deliver().await.unwrap();
    tokio::time::advance(Duration::from_millis(1000)).await;
    let within = deliver().await.unwrap();
    assert!(within.is_duplicate);
    assert_eq!(harness.platform.send_count(), 1);

    tokio::time::advance(Duration::from_millis(6000)).await;
    let after = deliver().await.unwrap();
    assert!(!after.is_duplicate);
    assert_eq!(harness.platform.send_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_deliveries_one_rejected() {
    let platform = MemoryPlatform::new().with_send_delay(Duration::from_millis(200));
    platform.add_resource(ARIA_AVATAR, png_bytes(), Some("image/png"));
    let harness = Harness::with_platform(Arc::new(platform), DeliverySettings::default());
    let channel = ChannelRef::text("X");
    let persona = aria();

    let (a, b) = tokio::join!(
        harness
            .engine
            .deliver(&channel, "first reply", Some(&persona), DeliverOptions::default()),
        harness
            .engine
            .deliver(&channel, "second reply", Some(&persona), DeliverOptions::default()),
    );
    let results = [a.unwrap(), b.unwrap()];

    let rejected = results
        .iter()
        .filter(|r| r.disposition == DeliveryDisposition::InFlight)
        .count();
    assert_eq!(rejected, 1);
    assert_eq!(harness.platform.send_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_embed_on_last_of_three_chunks() {
    let settings = DeliverySettings {
        max_message_length: 30,
        ..Default::default()
    };
    let harness = Harness::with_settings(settings);
    let content = "Paragraph one is here.\n\nParagraph two is here.\n\nParagraph three here.";

    let result = harness
        .engine
        .deliver(
            &ChannelRef::text("X"),
            content,
            Some(&aria()),
            DeliverOptions::default().with_embed(Embed::titled("Summary")),
        )
        .await
        .unwrap();

    assert_eq!(result.all_message_ids.len(), 3);
    let sent = harness.platform.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].payload.embeds.is_empty());
    assert!(sent[1].payload.embeds.is_empty());
    assert_eq!(sent[2].payload.embeds.len(), 1);
    assert!(sent.iter().all(|s| s.payload.content.chars().count() <= 30));
}

#[tokio::test(start_paused = true)]
async fn test_avatar_fetched_once_across_restart() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    harness
        .engine
        .deliver(&channel, "one", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    harness
        .engine
        .deliver(&channel, "two", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.platform.fetch_count(), 1);

    // The index file and the cached image survive the engine.
    let restarted = harness.restart();
    restarted
        .deliver(&channel, "three", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.platform.fetch_count(), 1);

    let urls: Vec<String> = harness
        .platform
        .sent()
        .into_iter()
        .map(|s| s.payload.avatar_url)
        .collect();
    assert_eq!(urls.len(), 3);
    assert!(urls.iter().all(|u| u == &urls[0]));
}

#[tokio::test(start_paused = true)]
async fn test_missing_avatar_file_refetched_once() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    harness
        .engine
        .deliver(&channel, "one", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();

    let entries = harness.engine.avatars().entries().await.unwrap();
    let path = harness
        .engine
        .avatars()
        .local_path(&entries[0].local_filename)
        .unwrap();
    std::fs::remove_file(path).unwrap();

    harness
        .engine
        .deliver(&channel, "two", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    harness
        .engine
        .deliver(&channel, "three", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.platform.fetch_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_avatar_uses_fallback() {
    let harness = Harness::with_platform(Arc::new(MemoryPlatform::new()), DeliverySettings::default());

    harness
        .engine
        .deliver(&ChannelRef::text("X"), "hi", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();

    assert_eq!(harness.platform.sent()[0].payload.avatar_url, FALLBACK_AVATAR);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_failures_escalate() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    for i in 0..6 {
        harness
            .platform
            .fail_next_send(DeliveryError::PayloadRejected("bad payload".into()));
        let err = harness
            .engine
            .deliver(&channel, &format!("attempt {}", i), Some(&aria()), DeliverOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::PayloadRejected(_)));

        let stats = harness.engine.tracker().stats();
        assert_eq!(stats.escalated_errors, usize::from(i == 5));
    }

    let records = harness.engine.tracker().records();
    let send = records.iter().find(|r| r.operation == "send").unwrap();
    assert_eq!(send.occurrence_count, 6);

    // Outside the window the count starts over.
    tokio::time::advance(Duration::from_secs(31 * 60)).await;
    harness
        .platform
        .fail_next_send(DeliveryError::PayloadRejected("bad payload".into()));
    let _ = harness
        .engine
        .deliver(&channel, "late", Some(&aria()), DeliverOptions::default())
        .await;

    let records = harness.engine.tracker().records();
    let send = records.iter().find(|r| r.operation == "send").unwrap();
    assert_eq!(send.occurrence_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_failure_is_not_suppressed() {
    let harness = Harness::new();
    let channel = ChannelRef::text("X");

    harness.platform.fail_next_send(DeliveryError::rate_limited(500));
    let err = harness
        .engine
        .deliver(&channel, "try me", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_retriable());

    let retried = harness
        .engine
        .deliver(&channel, "try me", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();
    assert!(!retried.is_duplicate);
    assert_eq!(harness.platform.send_count(), 1);
}
