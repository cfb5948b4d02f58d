// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn full_file_is_parsed() {
    let temp = TempDir::new().unwrap();
    let path = write(
        &temp,
        "client.toml",
        r#"
endpoint = "ws://localhost:3000/websocket"
resume_token = "tok"

[engine]
reconnect_delay_ms = 10000

[engine.priorities]
method = 200
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.endpoint().unwrap(), "ws://localhost:3000/websocket");
    assert_eq!(config.resume_token.as_deref(), Some("tok"));
    assert_eq!(config.engine.reconnect_delay_ms, 10_000);
    assert_eq!(config.engine.priorities.method, 200);
    assert_eq!(config.engine.priorities.login, 1_000);
    assert_eq!(config.engine.flush_debounce_ms, 10);
}

#[test]
fn discover_prefers_explicit_path() {
    let temp = TempDir::new().unwrap();
    write(&temp, CONFIG_FILE_NAME, r#"endpoint = "ws://local""#);
    let explicit = write(&temp, "other.toml", r#"endpoint = "ws://other""#);

    let config = Config::discover(Some(&explicit), temp.path()).unwrap();
    assert_eq!(config.endpoint.as_deref(), Some("ws://other"));
}

#[test]
fn discover_finds_file_in_dir() {
    let temp = TempDir::new().unwrap();
    write(&temp, CONFIG_FILE_NAME, r#"endpoint = "ws://local""#);

    let config = Config::discover(None, temp.path()).unwrap();
    assert_eq!(config.endpoint.as_deref(), Some("ws://local"));
}

#[test]
fn discover_without_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::discover(None, temp.path()).unwrap();
    assert_eq!(config, Config::default());
    assert!(matches!(config.endpoint(), Err(Error::NoEndpoint)));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let result = Config::discover(Some(&temp.path().join("absent.toml")), temp.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn malformed_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = write(&temp, CONFIG_FILE_NAME, "endpoint = ");
    assert!(matches!(Config::load(&path), Err(Error::Toml(_))));
}

#[test]
fn command_line_endpoint_overrides_file() {
    let config = Config { endpoint: Some("ws://file".into()), ..Default::default() };
    assert_eq!(config.clone().with_endpoint(None).endpoint().unwrap(), "ws://file");
    assert_eq!(config.with_endpoint(Some("ws://flag".into())).endpoint().unwrap(), "ws://flag");
}
