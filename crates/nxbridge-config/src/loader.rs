// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading and processing for nxbridge.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and resolve `${VAR}` / `${VAR:default}` placeholders
//! 2. Parse YAML, TOML or JSON (flat legacy JSON is recognized and converted)
//! 3. Apply environment variable overrides
//! 4. Resolve relative paths against the configuration file's directory
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! NXBRIDGE_CONTROLLER_IP=192.168.250.1
//! NXBRIDGE_SERVER_ENDPOINT=opc.tcp://0.0.0.0:4840/nxbridge/
//! NXBRIDGE_POLL_INTERVAL_SECS=0.5
//! NXBRIDGE_AUTH_ENABLED=false
//! NXBRIDGE_LOG_LEVEL=debug
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::legacy::LegacyConfig;
use crate::schema::{BridgeConfig, LogLevel};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for nxbridge.
///
/// # Examples
///
/// ```no_run
/// use nxbridge_config::loader::ConfigLoader;
///
/// let loader = ConfigLoader::new();
/// let config = loader.load("nxbridge.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables in values.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: "NXBRIDGE".to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Creates a builder for configuring the loader.
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format follows the extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format, path)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!(
            endpoint = %config.server.endpoint,
            controller = %config.controller.ip_address,
            tags = %config.tags_path.display(),
            "Configuration summary"
        );

        Ok(config)
    }

    /// Loads configuration from a string.
    ///
    /// Relative paths are kept as written unless a base path is set.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };
        let mut config = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if let (true, Some(base_path)) = (self.resolve_paths, &self.base_path) {
            resolve_relative_paths(&mut config, base_path);
        }

        config.validate()?;

        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_content(
        &self,
        content: &str,
        format: ConfigFormat,
        path: &Path,
    ) -> ConfigResult<BridgeConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)?
        } else {
            content.to_string()
        };

        parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })
    }

    /// Resolves environment variable placeholders in content.
    ///
    /// Supports the format: `${VAR_NAME}` or `${VAR_NAME:default}`
    fn resolve_env_placeholders(&self, content: &str) -> ConfigResult<String> {
        let mut result = String::with_capacity(content.len());
        let mut chars = content.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' || chars.peek() != Some(&'{') {
                result.push(c);
                continue;
            }
            chars.next();

            let mut var_content = String::new();
            let mut found_close = false;
            for c in chars.by_ref() {
                if c == '}' {
                    found_close = true;
                    break;
                }
                var_content.push(c);
            }

            if !found_close {
                result.push_str("${");
                result.push_str(&var_content);
                continue;
            }

            let (var_name, default_value) = match var_content.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (var_content.as_str(), None),
            };

            match (env::var(var_name), default_value) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => return Err(ConfigError::env_var_not_found(var_name)),
            }
        }

        Ok(result)
    }

    fn env_key(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    fn apply_env_overrides(&self, config: &mut BridgeConfig) -> ConfigResult<()> {
        if let Ok(value) = env::var(self.env_key("CONTROLLER_IP")) {
            config.controller.ip_address = value;
        }
        if let Ok(value) = env::var(self.env_key("SERVER_ENDPOINT")) {
            config.server.endpoint = value;
        }
        if let Ok(value) = env::var(self.env_key("TAGS_PATH")) {
            config.tags_path = PathBuf::from(value);
        }

        let key = self.env_key("POLL_INTERVAL_SECS");
        if let Ok(value) = env::var(&key) {
            config.controller.poll_interval_secs = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(key, "expected a number of seconds"))?;
        }

        if let Ok(value) = env::var(self.env_key("ENCRYPTION_ENABLED")) {
            config.security.encryption.enabled = parse_bool(&value);
        }
        if let Ok(value) = env::var(self.env_key("AUTH_ENABLED")) {
            config.security.authentication.enabled = parse_bool(&value);
        }

        let key = self.env_key("LOG_LEVEL");
        if let Ok(value) = env::var(&key) {
            match LogLevel::parse(&value) {
                Some(level) => config.logging.level = level,
                None => warn!("Ignoring {}: unknown log level '{}'", key, value),
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigLoaderBuilder
// =============================================================================

/// Builder for ConfigLoader.
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    base_path: Option<PathBuf>,
    env_prefix: Option<String>,
    resolve_env_vars: Option<bool>,
    resolve_paths: Option<bool>,
}

impl ConfigLoaderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base path.
    pub fn base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment prefix.
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn resolve_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = Some(enabled);
        self
    }

    /// Enables or disables path resolution.
    pub fn resolve_paths(mut self, enabled: bool) -> Self {
        self.resolve_paths = Some(enabled);
        self
    }

    /// Builds the ConfigLoader.
    pub fn build(self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();

        if let Some(base_path) = self.base_path {
            loader.base_path = Some(base_path);
        }
        if let Some(prefix) = self.env_prefix {
            loader.env_prefix = prefix;
        }
        if let Some(resolve_env_vars) = self.resolve_env_vars {
            loader.resolve_env_vars = resolve_env_vars;
        }
        if let Some(resolve_paths) = self.resolve_paths {
            loader.resolve_paths = resolve_paths;
        }

        loader
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format, structured or flat legacy.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yaml",
            ConfigFormat::Toml => "toml",
            ConfigFormat::Json => "json",
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            let document: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| ConfigError::serialization(e.to_string()))?;
            if LegacyConfig::matches(&document) {
                info!("Flat legacy configuration detected");
                let legacy: LegacyConfig = serde_json::from_value(document)
                    .map_err(|e| ConfigError::serialization(e.to_string()))?;
                legacy.into_bridge_config()
            } else {
                serde_json::from_value(document)
                    .map_err(|e| ConfigError::serialization(e.to_string()))
            }
        }
    }
}

fn resolve_relative_paths(config: &mut BridgeConfig, base_path: &Path) {
    if config.tags_path.is_relative() {
        config.tags_path = base_path.join(&config.tags_path);
    }

    let encryption = &mut config.security.encryption;
    for path in [
        &mut encryption.certificate_path,
        &mut encryption.private_key_path,
    ]
    .into_iter()
    .flatten()
    {
        if path.is_relative() {
            *path = base_path.join(&*path);
        }
    }
}

/// Parses a string to bool.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

/// YAML parsing through the config crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
///
/// ```no_run
/// use nxbridge_config::loader::load_config;
///
/// let config = load_config("nxbridge.yaml").unwrap();
/// ```
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<BridgeConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
server:
  endpoint: opc.tcp://0.0.0.0:4840/nxbridge/
  namespace_uri: urn:nxbridge:plc
  object_label: Line1

controller:
  ip_address: 192.168.250.1
  poll_interval_secs: 0.5

tags_path: tags.json

logging:
  level: debug
"#;

    #[test]
    fn test_load_yaml() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(YAML.as_bytes()).unwrap();

        let config = ConfigLoader::new().with_env_vars(false).load(file.path()).unwrap();

        assert_eq!(config.server.object_label, "Line1");
        assert_eq!(config.controller.ip_address, "192.168.250.1");
        assert_eq!(config.controller.poll_interval_secs, 0.5);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(
            config.tags_path,
            file.path().parent().unwrap().join("tags.json")
        );
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
tags_path = "/etc/nxbridge/tags.json"

[server]
endpoint = "opc.tcp://0.0.0.0:4840/"
namespace_uri = "urn:nxbridge:plc"

[controller]
ip_address = "10.0.0.5"

[security.authentication]
enabled = true
username = "operator"
password = "s3cret"
"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(toml, ConfigFormat::Toml)
            .unwrap();

        assert!(config.security.authentication.enabled);
        assert_eq!(
            config.security.authentication.password.as_ref().unwrap().raw(),
            "s3cret"
        );
        assert_eq!(config.tags_path, PathBuf::from("/etc/nxbridge/tags.json"));
    }

    #[test]
    fn test_load_legacy_json() {
        let json = r#"{
            "plc_ip_address": "192.168.250.1",
            "server_endpoint": "opc.tcp://0.0.0.0:4840/freeopcua/server/",
            "namespace_uri": "http://examples.freeopcua.github.io",
            "json_config_path": "tags.json",
            "label_Object": "PLC",
            "update_interval": 1,
            "timeout": 5,
            "use_encryption": false,
            "use_pass": false,
            "certificate_path": "",
            "private_key_path": "",
            "security_policy": "Basic256Sha256_SignAndEncrypt",
            "username": "",
            "password": ""
        }"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();

        assert_eq!(config.controller.ip_address, "192.168.250.1");
        assert_eq!(config.server.object_label, "PLC");
        assert!(!config.security.encryption.enabled);
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("nxbridge.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("nxbridge.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config_server.json")).unwrap(),
            ConfigFormat::Json
        );
        assert!(ConfigFormat::from_path(Path::new("nxbridge.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("nxbridge")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result = loader
            .resolve_env_placeholders("ip: ${NXBRIDGE_TEST_UNSET_VAR:10.0.0.9}")
            .unwrap();
        assert_eq!(result, "ip: 10.0.0.9");

        let result = loader.resolve_env_placeholders("literal ${unclosed").unwrap();
        assert_eq!(result, "literal ${unclosed");
    }

    #[test]
    fn test_env_placeholder_missing() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("ip: ${NXBRIDGE_TEST_UNSET_VAR}");
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool("Yes"));
        assert!(parse_bool("enabled"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn test_loader_builder() {
        let loader = ConfigLoader::builder()
            .env_prefix("PLCGW")
            .resolve_env_vars(false)
            .resolve_paths(false)
            .build();

        assert_eq!(loader.env_prefix, "PLCGW");
        assert!(!loader.resolve_env_vars);
        assert!(!loader.resolve_paths);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let yaml = YAML.replace("0.5", "0");
        let result = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(&yaml, ConfigFormat::Yaml);
        assert!(matches!(result, Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn test_file_not_found() {
        let result = ConfigLoader::new().load("/nonexistent/path/nxbridge.yaml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_parse_error_carries_path() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        file.write_all(b"{ not json").unwrap();

        let result = ConfigLoader::new().load(file.path());
        match result {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("Expected Parse error, got {:?}", other),
        }
    }
}
