// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading configuration files in every supported layout and feeding the tag
//! file they reference into the engine.

use std::time::Duration;

use nxbridge_config::{
    load_config, load_config_str, ConfigError, ConfigFormat, LogFormat, LogLevel, TagDefinitions,
};
use nxbridge_core::{CycleOutcome, DataType, Value, DEFAULT_HEALTH_TAG};
use nxbridge_tests::prelude::*;

// =============================================================================
// Layouts
// =============================================================================

#[test]
fn test_yaml_config_and_tag_file() {
    let dir = ConfigDir::with_standard_tags();
    let path = dir.write("nxbridge.yaml", YAML_CONFIG);

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.namespace_uri, "urn:plant:line1");
    assert_eq!(config.server.object_label, "Line1");
    assert_eq!(config.server.health_tag, DEFAULT_HEALTH_TAG);
    assert_eq!(config.controller.ip_address, "192.168.250.1");
    assert_eq!(config.controller.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.tags_path, dir.path("tags.json"));

    let tags = TagDefinitions::load(&config.tags_path, &config.server.health_tag).unwrap();
    assert_eq!(tags.len(), 4);
    assert_eq!(tags.writable_count(), 3);

    let registry = tags.into_registry().unwrap();
    let temperature = registry.get("Temperature").unwrap();
    assert_eq!(temperature.data_type(), DataType::Float);
    assert!(!temperature.is_writable());
    assert_eq!(temperature.initial_value(), &Value::Float32(21.5));
}

#[test]
fn test_toml_config_with_authentication() {
    let dir = ConfigDir::with_standard_tags();
    let path = dir.write("nxbridge.toml", TOML_CONFIG);

    let config = load_config(&path).unwrap();
    assert_eq!(config.server.object_label, "PLC");
    assert_eq!(config.controller.reconnect_backoff(), Duration::from_secs(5));

    let auth = &config.security.authentication;
    assert!(auth.enabled);
    assert_eq!(auth.username.as_deref(), Some("operator"));
    assert_eq!(auth.password.as_ref().map(|p| p.raw()), Some("s3cret"));

    // The secret never reaches debug output.
    assert!(!format!("{:?}", config).contains("s3cret"));
}

#[test]
fn test_legacy_config_is_converted() {
    let dir = ConfigDir::with_standard_tags();
    let path = dir.write("config_server.json", LEGACY_CONFIG);

    let config = load_config(&path).unwrap();
    assert_eq!(config.controller.ip_address, "192.168.250.3");
    assert_eq!(config.server.namespace_uri, "urn:plant:legacy");
    assert_eq!(config.server.object_label, "Machine");
    assert_eq!(config.server.health_tag, DEFAULT_HEALTH_TAG);
    assert_eq!(config.controller.poll_interval(), Duration::from_secs(2));
    assert!(!config.security.encryption.enabled);
    assert!(!config.security.authentication.enabled);
    assert_eq!(config.tags_path, dir.path("tags.json"));
    assert_eq!(config.warnings().len(), 2);

    let tags = TagDefinitions::load(&config.tags_path, &config.server.health_tag).unwrap();
    assert_eq!(tags.len(), 4);
}

#[test]
fn test_unknown_extension_is_rejected() {
    let dir = ConfigDir::with_standard_tags();
    let path = dir.write("nxbridge.ini", "[server]");

    let err = load_config(&path).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
}

#[test]
fn test_missing_config_file() {
    let dir = ConfigDir::new();
    let err = load_config(dir.path("absent.yaml")).unwrap_err();
    assert!(err.is_io_error());
}

// =============================================================================
// Environment Placeholders
// =============================================================================

const PLACEHOLDER_CONFIG: &str = r#"
server:
  endpoint: "opc.tcp://0.0.0.0:4840/"
  namespace_uri: "urn:plant:line1"
controller:
  ip_address: "${NXBRIDGE_IT_UNSET_PLC_IP:10.0.0.9}"
tags_path: "tags.json"
"#;

#[test]
fn test_placeholder_default_is_used() {
    let config = load_config_str(PLACEHOLDER_CONFIG, ConfigFormat::Yaml).unwrap();
    assert_eq!(config.controller.ip_address, "10.0.0.9");
}

#[test]
fn test_placeholder_without_default_must_be_set() {
    let content = PLACEHOLDER_CONFIG.replace(":10.0.0.9}", "}");
    let err = load_config_str(&content, ConfigFormat::Yaml).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarNotFound { .. }));
}

// =============================================================================
// Tag File
// =============================================================================

#[test]
fn test_tag_file_rejects_health_tag_name() {
    let content = r#"{ "COM_PLC_FAIL": { "value": false, "write": true } }"#;
    let err = TagDefinitions::parse(content, DEFAULT_HEALTH_TAG).unwrap_err();
    assert!(err.is_tag_error());
}

#[test]
fn test_tag_file_rejects_duplicates() {
    let content = r#"{
        "Speed": { "value": 1, "write": true },
        "Speed": { "value": 2, "write": false }
    }"#;
    let err = TagDefinitions::parse(content, DEFAULT_HEALTH_TAG).unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateTag { .. }));
}

#[test]
fn test_tag_file_explicit_type_must_match_value() {
    let content = r#"{ "Speed": { "value": "fast", "write": true, "type": "int32" } }"#;
    let err = TagDefinitions::parse(content, DEFAULT_HEALTH_TAG).unwrap_err();
    assert!(err.is_tag_error());
}

#[tokio::test]
async fn test_tag_file_drives_engine() {
    let tags = TagDefinitions::parse(STANDARD_TAG_FILE, DEFAULT_HEALTH_TAG).unwrap();
    let harness = BridgeHarness::new(tags.iter().cloned().collect());
    harness.connect().await.unwrap();

    let outcome = harness.engine.poll_once().await;
    assert!(matches!(outcome, CycleOutcome::Completed { published: 4 }));
    assert!(harness.publisher.is_writable("Speed"));
    assert!(!harness.publisher.is_writable("Temperature"));
    assert_eq!(harness.publisher.value("Label"), Some(Value::from("A")));
}
