//! Gateway integration tests.
//!
//! The URLs the engine hands to the platform must be served by the
//! gateway for as long as the cache entry exists.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use personacast_core::types::ChannelRef;
use personacast_delivery::DeliverOptions;
use personacast_gateway::{Gateway, GatewayConfig};
use personacast_integration_tests::{aria, png_bytes, Harness, PUBLIC_BASE};
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_delivered_avatar_url_is_served() {
    let harness = Harness::new();
    harness
        .engine
        .deliver(&ChannelRef::text("X"), "hello", Some(&aria()), DeliverOptions::default())
        .await
        .unwrap();

    let avatar_url = harness.platform.sent()[0].payload.avatar_url.clone();
    let path = avatar_url.strip_prefix(PUBLIC_BASE).unwrap().to_string();

    let router = Gateway::new(GatewayConfig::default(), harness.engine.clone()).router();
    let response = router.clone().oneshot(get(&path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), png_bytes().as_slice());

    // Invalidating removes the file, and the URL stops resolving.
    assert!(harness.engine.avatars().invalidate("Aria").await.unwrap());
    let response = router.oneshot(get(&path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stats_report_tracked_errors() {
    let harness = Harness::new();
    harness
        .platform
        .fail_next_send(personacast_delivery::DeliveryError::endpoint_not_found("wh-1"));
    let _ = harness
        .engine
        .deliver(&ChannelRef::text("X"), "hello", Some(&aria()), DeliverOptions::default())
        .await;

    let router = Gateway::new(GatewayConfig::default(), harness.engine.clone()).router();
    let response = router.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let stats: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(stats["errors"]["distinct_errors"], 1);
    assert_eq!(stats["records"][0]["operation"], "send");
    assert_eq!(stats["pending"], 0);
    // The stale endpoint was evicted.
    assert_eq!(stats["endpoints"], 0);
}
