// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Test fixtures: tag sets, address space layouts and configuration files.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use nxbridge_core::{AddressSpaceLayout, DataType, TagDescriptor, Value, DEFAULT_HEALTH_TAG};

// =============================================================================
// Tag Fixtures
// =============================================================================

/// Tag descriptors used across the integration tests.
pub struct TagFixtures;

impl TagFixtures {
    /// `Speed`: writable `int32`, initially 10.
    pub fn speed() -> TagDescriptor {
        Self::tag("Speed", DataType::Int32, true, Value::Int32(10))
    }

    /// `Temperature`: read-only `float`, initially 21.5.
    pub fn temperature() -> TagDescriptor {
        Self::tag("Temperature", DataType::Float, false, Value::Float32(21.5))
    }

    /// `Running`: writable `bool`, initially false.
    pub fn running() -> TagDescriptor {
        Self::tag("Running", DataType::Bool, true, Value::Bool(false))
    }

    /// `Label`: writable `string`, initially "A".
    pub fn label() -> TagDescriptor {
        Self::tag("Label", DataType::String, true, Value::from("A"))
    }

    /// All four tags, one per declared type.
    pub fn standard_set() -> Vec<TagDescriptor> {
        vec![Self::speed(), Self::temperature(), Self::running(), Self::label()]
    }

    fn tag(name: &str, data_type: DataType, writable: bool, initial: Value) -> TagDescriptor {
        let descriptor = TagDescriptor::new(name, data_type, writable);
        descriptor
            .clone()
            .with_initial_value(&initial)
            .unwrap_or(descriptor)
    }
}

/// The tag file matching [`TagFixtures::standard_set`].
pub const STANDARD_TAG_FILE: &str = r#"{
    "Speed":       { "value": 10,   "write": true },
    "Temperature": { "value": 21.5, "write": false },
    "Running":     { "value": false, "write": true },
    "Label":       { "value": "A",  "write": true }
}"#;

/// The layout the harness exposes tags under.
pub fn layout() -> AddressSpaceLayout {
    AddressSpaceLayout {
        namespace_uri: "urn:nxbridge:test".to_string(),
        object_label: "PLC".to_string(),
        health_tag: DEFAULT_HEALTH_TAG.to_string(),
    }
}

// =============================================================================
// Configuration Fixtures
// =============================================================================

/// Structured YAML configuration referencing `tags.json`.
pub const YAML_CONFIG: &str = r#"
server:
  endpoint: "opc.tcp://0.0.0.0:4840/freeopcua/server/"
  namespace_uri: "urn:plant:line1"
  object_label: "Line1"
controller:
  ip_address: "192.168.250.1"
  poll_interval_secs: 0.5
tags_path: "tags.json"
logging:
  level: debug
  format: json
"#;

/// Structured TOML configuration referencing `tags.json`.
pub const TOML_CONFIG: &str = r#"
tags_path = "tags.json"

[server]
endpoint = "opc.tcp://0.0.0.0:4841/"
namespace_uri = "urn:plant:line2"

[controller]
ip_address = "192.168.250.2"
reconnect_backoff_secs = 5.0

[security.authentication]
enabled = true
username = "operator"
password = "s3cret"
"#;

/// Flat legacy configuration referencing `tags.json`.
pub const LEGACY_CONFIG: &str = r#"{
    "plc_ip_address": "192.168.250.3",
    "server_endpoint": "opc.tcp://0.0.0.0:4840/freeopcua/server/",
    "namespace_uri": "urn:plant:legacy",
    "json_config_path": "tags.json",
    "label_Object": "Machine",
    "update_interval": 2,
    "timeout": 5,
    "use_encryption": false,
    "use_pass": false
}"#;

/// A temporary directory holding a configuration and its tag file.
pub struct ConfigDir {
    dir: TempDir,
}

impl ConfigDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Creates a directory with the standard tag file as `tags.json`.
    pub fn with_standard_tags() -> Self {
        let dir = Self::new();
        dir.write("tags.json", STANDARD_TAG_FILE);
        dir
    }

    /// Writes a file and returns its path.
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).expect("write fixture file");
        path
    }

    /// Returns the path of a file in the directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Default for ConfigDir {
    fn default() -> Self {
        Self::new()
    }
}
