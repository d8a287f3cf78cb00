//! CLI binary integration tests.
//!
//! These tests run the compiled `personacast` binary to verify command
//! routing, help text, and the dry-run delivery path.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn personacast(config: Option<&Path>, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_personacast"));
    cmd.env_remove("PERSONACAST_CONFIG").env_remove("RUST_LOG");
    if let Some(config) = config {
        cmd.arg("--config").arg(config);
    }
    cmd.args(args).output().expect("failed to run personacast")
}

fn write_config(dir: &Path) -> PathBuf {
    let path = dir.join("personacast.json5");
    let cache = dir.join("avatars");
    std::fs::write(
        &path,
        format!(
            r#"{{
                delivery: {{ max_message_length: 20, chunk_delay_ms: 0 }},
                avatar: {{ cache_dir: {:?} }},
                personas: {{ Aria: {{ display_name: "Aria" }} }},
            }}"#,
            cache.to_string_lossy()
        ),
    )
    .unwrap();
    path
}

#[test]
fn test_cli_version() {
    let output = personacast(None, &["version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("personacast "), "got: {}", stdout);
}

#[test]
fn test_cli_help_lists_commands() {
    let output = personacast(None, &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["serve", "deliver", "split", "avatars", "config"] {
        assert!(stdout.contains(command), "help should mention {}: {}", command, stdout);
    }
}

#[test]
fn test_cli_unknown_command() {
    let output = personacast(None, &["nonexistent-command"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_split_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = personacast(
        Some(&config),
        &["split", "--json", "First paragraph.\n\nSecond paragraph."],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let chunks: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(chunks, vec!["First paragraph.", "Second paragraph."]);
}

#[test]
fn test_cli_deliver_dry_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = personacast(
        Some(&config),
        &[
            "deliver",
            "--channel",
            "123",
            "--persona",
            "Aria",
            "--dry-run",
            "--json",
            "First paragraph.\n\nSecond paragraph.",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["is_duplicate"], false);
    assert_eq!(result["disposition"], "sent");
    assert_eq!(result["all_message_ids"].as_array().unwrap().len(), 2);
}

#[test]
fn test_cli_deliver_unknown_persona() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let output = personacast(
        Some(&config),
        &["deliver", "--channel", "1", "--persona", "Nobody", "--dry-run", "hi"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown persona"));
}

#[test]
fn test_cli_config_validate_reports_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json5");
    std::fs::write(&path, "{ tracking: { escalation_threshold: 0 } }").unwrap();

    let output = personacast(Some(&path), &["config", "validate"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("escalation_threshold"));
}
