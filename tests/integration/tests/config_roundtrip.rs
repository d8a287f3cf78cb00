//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration survives a trip through disk and
//! that a loaded config drives the engine it builds.

use personacast_core::config::{BindMode, Config};
use personacast_core::types::ChannelRef;
use personacast_delivery::{
    DeliverOptions, DeliveryEngine, PersonaDirectory, StaticPersonaDirectory,
};
use personacast_integration_tests::{platform, ARIA_AVATAR};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("personacast.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, config.gateway.port);
    assert_eq!(loaded.gateway.bind, config.gateway.bind);
    assert_eq!(
        loaded.delivery.max_message_length,
        config.delivery.max_message_length
    );
    assert_eq!(loaded.tracking.escalation_threshold, 6);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("personacast.json5");

    let mut config = Config::default();
    config.gateway.port = 9090;
    config.gateway.bind = BindMode::Lan;
    config.delivery.chunk_delay_ms = 0;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.port, 9090);
    assert_eq!(loaded.gateway.bind, BindMode::Lan);
    assert_eq!(loaded.delivery.chunk_delay_ms, 0);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/personacast.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_config_drives_engine() {
    let dir = TempDir::new().unwrap();
    let cache_dir = dir.path().join("avatars");
    let text = format!(
        r#"{{
            // JSON5 allows comments and trailing commas
            delivery: {{ max_message_length: 40, fallback_display_name: "Helper" }},
            avatar: {{ cache_dir: {:?}, public_base_url: "http://avatars.test" }},
            platform: {{ webhook_name: "pc-test" }},
            personas: {{
                Aria: {{ display_name: "Aria ✦", avatar_url: "{}" }},
            }},
        }}"#,
        cache_dir.to_string_lossy(),
        ARIA_AVATAR,
    );
    let config = Config::parse(&text).unwrap();
    config.validate().unwrap();

    let platform = platform();
    let directory = Arc::new(StaticPersonaDirectory::from_config(&config));
    let engine = DeliveryEngine::builder(platform.clone())
        .config(&config)
        .unwrap()
        .directory(directory.clone())
        .build()
        .unwrap();

    let aria = directory.get_persona("Aria").await.unwrap();
    engine
        .deliver(
            &ChannelRef::text("X"),
            "A reply long enough that forty characters cannot hold it all.",
            Some(&aria),
            DeliverOptions::default(),
        )
        .await
        .unwrap();
    engine
        .deliver(&ChannelRef::text("Y"), "no persona", None, DeliverOptions::default())
        .await
        .unwrap();

    let sent = platform.sent();
    assert!(sent.len() >= 3);
    assert!(sent.iter().all(|s| s.payload.content.chars().count() <= 40));
    assert_eq!(sent[0].payload.username, "Aria ✦");
    assert!(sent[0].payload.avatar_url.starts_with("http://avatars.test/avatars/"));
    assert_eq!(sent.last().unwrap().payload.username, "Helper");
    assert_eq!(sent[0].endpoint.name.as_deref(), Some("pc-test"));

    // The remote source stays the source of truth.
    let unchanged = directory.get_persona("Aria").await.unwrap();
    assert_eq!(unchanged.avatar_url.as_deref(), Some(ARIA_AVATAR));
    assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);
}
