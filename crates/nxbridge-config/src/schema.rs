// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for nxbridge.
//!
//! # Schema Structure
//!
//! ```text
//! BridgeConfig
//! ├── server: ServerConfig
//! ├── controller: ControllerConfig
//! ├── security: SecurityConfig
//! │   ├── encryption: EncryptionConfig
//! │   └── authentication: AuthenticationConfig
//! ├── tags_path: PathBuf
//! └── logging: LoggingConfig
//! ```

use crate::error::{ConfigError, ConfigResult};
use nxbridge_core::DEFAULT_HEALTH_TAG;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Default OPC UA TCP port.
pub const DEFAULT_OPCUA_PORT: u16 = 4840;

/// Default poll interval in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL_SECS: f64 = 0.01;

/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL_SECS: f64 = 3600.0;

/// Default reconnect backoff in seconds.
pub const DEFAULT_RECONNECT_BACKOFF_SECS: f64 = 3.0;

/// Default subscription publishing interval in milliseconds.
pub const DEFAULT_PUBLISHING_INTERVAL_MS: u64 = 1000;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure for nxbridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// OPC UA server configuration.
    pub server: ServerConfig,

    /// Controller configuration.
    pub controller: ControllerConfig,

    /// Security configuration.
    #[serde(default)]
    pub security: SecurityConfig,

    /// Path of the tag definition file.
    pub tags_path: PathBuf,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.controller.validate()?;
        self.security.validate()?;
        if self.tags_path.as_os_str().is_empty() {
            return Err(ConfigError::validation("tags_path", "cannot be empty"));
        }
        Ok(())
    }

    /// Returns non-fatal findings, such as insecure settings.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.security.encryption.enabled {
            warnings.push("encryption is disabled; traffic is not signed or encrypted".to_string());
        }
        if !self.security.authentication.enabled {
            warnings.push("authentication is disabled; anonymous clients can write tags".to_string());
        }
        if self.security.encryption.enabled
            && self.security.encryption.security_policy.mode == SecurityMode::Sign
        {
            warnings.push("security policy signs but does not encrypt messages".to_string());
        }
        warnings
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// OPC UA server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Endpoint URL, e.g. `opc.tcp://0.0.0.0:4840/freeopcua/server/`.
    pub endpoint: String,

    /// Namespace URI for all bridge nodes.
    pub namespace_uri: String,

    /// Label of the object holding the tag variables.
    #[serde(default = "default_object_label")]
    pub object_label: String,

    /// Name of the controller health node.
    #[serde(default = "default_health_tag")]
    pub health_tag: String,

    /// Subscription publishing interval in milliseconds.
    #[serde(default = "default_publishing_interval")]
    pub publishing_interval_ms: u64,

    /// Application name announced to clients.
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

fn default_object_label() -> String {
    "PLC".to_string()
}

fn default_health_tag() -> String {
    DEFAULT_HEALTH_TAG.to_string()
}

fn default_publishing_interval() -> u64 {
    DEFAULT_PUBLISHING_INTERVAL_MS
}

fn default_application_name() -> String {
    "nxbridge".to_string()
}

impl ServerConfig {
    /// Validates the server configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        EndpointUrl::parse(&self.endpoint)?;
        if self.namespace_uri.trim().is_empty() {
            return Err(ConfigError::validation("server.namespace_uri", "cannot be empty"));
        }
        if self.object_label.trim().is_empty() {
            return Err(ConfigError::validation("server.object_label", "cannot be empty"));
        }
        if self.health_tag.trim().is_empty() {
            return Err(ConfigError::validation("server.health_tag", "cannot be empty"));
        }
        if self.publishing_interval_ms == 0 {
            return Err(ConfigError::validation(
                "server.publishing_interval_ms",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the parsed endpoint.
    pub fn endpoint_url(&self) -> ConfigResult<EndpointUrl> {
        EndpointUrl::parse(&self.endpoint)
    }

    /// Returns the publishing interval.
    pub fn publishing_interval(&self) -> Duration {
        Duration::from_millis(self.publishing_interval_ms)
    }
}

/// A parsed `opc.tcp://host:port/path` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Resource path, always starting with `/`.
    pub path: String,
}

impl EndpointUrl {
    /// Parses an endpoint URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use nxbridge_config::schema::EndpointUrl;
    ///
    /// let url = EndpointUrl::parse("opc.tcp://0.0.0.0:4841/freeopcua/server/").unwrap();
    /// assert_eq!(url.port, 4841);
    /// assert_eq!(url.path, "/freeopcua/server/");
    /// ```
    pub fn parse(endpoint: &str) -> ConfigResult<Self> {
        let rest = endpoint.strip_prefix("opc.tcp://").ok_or_else(|| {
            ConfigError::validation("server.endpoint", "must start with opc.tcp://")
        })?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    ConfigError::validation("server.endpoint", format!("invalid port '{}'", port))
                })?;
                (host, port)
            }
            None => (authority, DEFAULT_OPCUA_PORT),
        };

        if host.is_empty() {
            return Err(ConfigError::validation("server.endpoint", "missing host"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "opc.tcp://{}:{}{}", self.host, self.port, self.path)
    }
}

// =============================================================================
// Controller Configuration
// =============================================================================

/// Controller connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerConfig {
    /// Controller IP address.
    pub ip_address: String,

    /// Poll interval in seconds; fractions are allowed.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,

    /// Delay between reconnect attempts in seconds.
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_secs: f64,

    /// Session backend.
    #[serde(default)]
    pub backend: ControllerBackend,
}

fn default_poll_interval() -> f64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_reconnect_backoff() -> f64 {
    DEFAULT_RECONNECT_BACKOFF_SECS
}

impl ControllerConfig {
    /// Validates the controller configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ip_address.trim().is_empty() {
            return Err(ConfigError::validation("controller.ip_address", "cannot be empty"));
        }
        if !self.poll_interval_secs.is_finite()
            || self.poll_interval_secs < MIN_POLL_INTERVAL_SECS
            || self.poll_interval_secs > MAX_POLL_INTERVAL_SECS
        {
            return Err(ConfigError::out_of_range(
                "controller.poll_interval_secs",
                self.poll_interval_secs,
                MIN_POLL_INTERVAL_SECS,
                MAX_POLL_INTERVAL_SECS,
            ));
        }
        if !self.reconnect_backoff_secs.is_finite() || self.reconnect_backoff_secs <= 0.0 {
            return Err(ConfigError::validation(
                "controller.reconnect_backoff_secs",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    /// Returns the reconnect backoff.
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_backoff_secs)
    }
}

/// Controller session backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerBackend {
    /// In-memory controller seeded from the tag file.
    #[default]
    Simulated,

    /// EtherNet/IP explicit messaging to the controller at `ip_address`.
    Eip,
}

impl fmt::Display for ControllerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerBackend::Simulated => write!(f, "simulated"),
            ControllerBackend::Eip => write!(f, "eip"),
        }
    }
}

// =============================================================================
// Security Configuration
// =============================================================================

/// Security settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    /// Message security.
    #[serde(default)]
    pub encryption: EncryptionConfig,

    /// User authentication.
    #[serde(default)]
    pub authentication: AuthenticationConfig,
}

impl SecurityConfig {
    /// Validates the security configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.encryption.validate()?;
        self.authentication.validate()
    }
}

/// Message security settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptionConfig {
    /// Enables signed/encrypted endpoints.
    #[serde(default)]
    pub enabled: bool,

    /// Server certificate (DER or PEM).
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,

    /// Server private key (PEM).
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Security policy, e.g. `Basic256Sha256_SignAndEncrypt`.
    #[serde(default)]
    pub security_policy: SecurityPolicyName,
}

impl EncryptionConfig {
    /// Validates the encryption configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.certificate_path.is_none() {
            return Err(ConfigError::missing_field("security.encryption.certificate_path"));
        }
        if self.private_key_path.is_none() {
            return Err(ConfigError::missing_field("security.encryption.private_key_path"));
        }
        if self.security_policy.policy == SecurityPolicy::None {
            return Err(ConfigError::validation(
                "security.encryption.security_policy",
                "encryption requires a policy other than NoSecurity",
            ));
        }
        Ok(())
    }
}

/// Username/password authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthenticationConfig {
    /// Rejects anonymous clients and checks credentials.
    #[serde(default)]
    pub enabled: bool,

    /// Accepted username.
    #[serde(default)]
    pub username: Option<String>,

    /// Accepted password.
    #[serde(default)]
    pub password: Option<SecretValue>,
}

impl AuthenticationConfig {
    /// Validates the authentication configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.enabled {
            return Ok(());
        }
        match &self.username {
            Some(username) if !username.is_empty() => {}
            _ => return Err(ConfigError::missing_field("security.authentication.username")),
        }
        match &self.password {
            Some(password) if !password.raw().is_empty() => Ok(()),
            _ => Err(ConfigError::missing_field("security.authentication.password")),
        }
    }
}

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityPolicy {
    /// No security.
    #[default]
    None,
    /// Basic128Rsa15 policy.
    Basic128Rsa15,
    /// Basic256 policy.
    Basic256,
    /// Basic256Sha256 policy.
    Basic256Sha256,
    /// Aes128-Sha256-RsaOaep policy.
    Aes128Sha256RsaOaep,
    /// Aes256-Sha256-RsaPss policy.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    fn name(&self) -> &'static str {
        match self {
            SecurityPolicy::None => "None",
            SecurityPolicy::Basic128Rsa15 => "Basic128Rsa15",
            SecurityPolicy::Basic256 => "Basic256",
            SecurityPolicy::Basic256Sha256 => "Basic256Sha256",
            SecurityPolicy::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            SecurityPolicy::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }
}

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityMode {
    /// No security.
    #[default]
    None,
    /// Sign messages.
    Sign,
    /// Sign and encrypt messages.
    SignAndEncrypt,
}

/// A policy and mode pair written as one name.
///
/// Names follow the common OPC UA stack convention: `NoSecurity`, or the
/// policy name and mode joined by an underscore, such as
/// `Basic256Sha256_SignAndEncrypt` or `Basic128Rsa15_Sign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SecurityPolicyName {
    /// Security policy.
    pub policy: SecurityPolicy,
    /// Security mode.
    pub mode: SecurityMode,
}

impl FromStr for SecurityPolicyName {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            ConfigError::validation(
                "security.encryption.security_policy",
                format!("unknown security policy '{}'", name),
            )
        };

        if name == "NoSecurity" {
            return Ok(Self::default());
        }

        let (policy, mode) = name.split_once('_').ok_or_else(invalid)?;
        let policy = match policy {
            "Basic128Rsa15" => SecurityPolicy::Basic128Rsa15,
            "Basic256" => SecurityPolicy::Basic256,
            "Basic256Sha256" => SecurityPolicy::Basic256Sha256,
            "Aes128Sha256RsaOaep" => SecurityPolicy::Aes128Sha256RsaOaep,
            "Aes256Sha256RsaPss" => SecurityPolicy::Aes256Sha256RsaPss,
            _ => return Err(invalid()),
        };
        let mode = match mode {
            "Sign" => SecurityMode::Sign,
            "SignAndEncrypt" => SecurityMode::SignAndEncrypt,
            _ => return Err(invalid()),
        };
        Ok(Self { policy, mode })
    }
}

impl fmt::Display for SecurityPolicyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            SecurityMode::None => write!(f, "NoSecurity"),
            SecurityMode::Sign => write!(f, "{}_Sign", self.policy.name()),
            SecurityMode::SignAndEncrypt => write!(f, "{}_SignAndEncrypt", self.policy.name()),
        }
    }
}

impl Serialize for SecurityPolicyName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SecurityPolicyName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Compact text.
    Compact,
    /// JSON lines.
    Json,
}

// =============================================================================
// Secret Value
// =============================================================================

/// A secret that never shows up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    /// Creates a new secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret.
    pub fn raw(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretValue(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        serde_json::from_value(serde_json::json!({
            "server": {
                "endpoint": "opc.tcp://0.0.0.0:4840/nxbridge/",
                "namespace_uri": "urn:nxbridge:plc"
            },
            "controller": { "ip_address": "192.168.250.1" },
            "tags_path": "tags.json"
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.server.object_label, "PLC");
        assert_eq!(config.server.health_tag, "COM_PLC_FAIL");
        assert_eq!(config.server.publishing_interval_ms, 1000);
        assert_eq!(config.controller.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.controller.reconnect_backoff(), Duration::from_secs(3));
        assert_eq!(config.controller.backend, ControllerBackend::Simulated);
        assert!(!config.security.encryption.enabled);
        assert!(config.validate().is_ok());
        assert_eq!(config.warnings().len(), 2);
    }

    #[test]
    fn test_controller_backend() {
        let config: BridgeConfig = serde_json::from_value(serde_json::json!({
            "server": {
                "endpoint": "opc.tcp://0.0.0.0:4840/nxbridge/",
                "namespace_uri": "urn:nxbridge:plc"
            },
            "controller": { "ip_address": "192.168.250.1", "backend": "eip" },
            "tags_path": "tags.json"
        }))
        .unwrap();
        assert_eq!(config.controller.backend, ControllerBackend::Eip);
        assert_eq!(config.controller.backend.to_string(), "eip");

        let unknown = serde_json::from_value::<ControllerBackend>(serde_json::json!("modbus"));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_endpoint_parse() {
        let url = EndpointUrl::parse("opc.tcp://plc-host/server").unwrap();
        assert_eq!(url.host, "plc-host");
        assert_eq!(url.port, DEFAULT_OPCUA_PORT);
        assert_eq!(url.to_string(), "opc.tcp://plc-host:4840/server");

        assert!(EndpointUrl::parse("http://localhost:4840").is_err());
        assert!(EndpointUrl::parse("opc.tcp://:4840").is_err());
        assert!(EndpointUrl::parse("opc.tcp://host:99999/").is_err());
    }

    #[test]
    fn test_poll_interval_validation() {
        let mut config = config();
        config.controller.poll_interval_secs = 0.5;
        assert!(config.validate().is_ok());
        assert_eq!(config.controller.poll_interval(), Duration::from_millis(500));

        config.controller.poll_interval_secs = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_security_policy_names() {
        let name: SecurityPolicyName = "Basic256Sha256_SignAndEncrypt".parse().unwrap();
        assert_eq!(name.policy, SecurityPolicy::Basic256Sha256);
        assert_eq!(name.mode, SecurityMode::SignAndEncrypt);
        assert_eq!(name.to_string(), "Basic256Sha256_SignAndEncrypt");

        let name: SecurityPolicyName = "NoSecurity".parse().unwrap();
        assert_eq!(name, SecurityPolicyName::default());

        assert!("Basic256Sha256".parse::<SecurityPolicyName>().is_err());
        assert!("Rot13_Sign".parse::<SecurityPolicyName>().is_err());
    }

    #[test]
    fn test_encryption_requires_paths() {
        let mut config = config();
        config.security.encryption.enabled = true;
        config.security.encryption.security_policy =
            "Basic256Sha256_Sign".parse().unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField { .. })
        ));

        config.security.encryption.certificate_path = Some("cert.der".into());
        config.security.encryption.private_key_path = Some("key.pem".into());
        assert!(config.validate().is_ok());
        assert!(config
            .warnings()
            .iter()
            .any(|w| w.contains("does not encrypt")));
    }

    #[test]
    fn test_authentication_requires_credentials() {
        let mut config = config();
        config.security.authentication.enabled = true;
        config.security.authentication.username = Some("operator".into());
        assert!(config.validate().is_err());

        config.security.authentication.password = Some(SecretValue::new("s3cret"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_value_redacted() {
        let secret = SecretValue::new("s3cret");
        assert_eq!(secret.to_string(), "***");
        assert!(!format!("{:?}", secret).contains("s3cret"));
        assert_eq!(secret.raw(), "s3cret");
    }
}
