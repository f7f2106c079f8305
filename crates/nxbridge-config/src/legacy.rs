// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Flat legacy configuration.
//!
//! Older deployments describe the bridge with a single flat JSON object
//! (`config_server.json`). It is accepted as-is and converted into a
//! [`BridgeConfig`]. Empty strings mean "not set".

use std::path::PathBuf;

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigResult;
use crate::schema::{
    AuthenticationConfig, BridgeConfig, ControllerBackend, ControllerConfig, EncryptionConfig,
    LoggingConfig, SecretValue, SecurityConfig, ServerConfig, DEFAULT_PUBLISHING_INTERVAL_MS,
    DEFAULT_RECONNECT_BACKOFF_SECS,
};
use nxbridge_core::DEFAULT_HEALTH_TAG;

/// Key whose presence marks a document as legacy.
const MARKER_KEY: &str = "plc_ip_address";

/// The flat legacy document.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyConfig {
    plc_ip_address: String,
    server_endpoint: String,
    namespace_uri: String,
    json_config_path: PathBuf,
    #[serde(rename = "label_Object")]
    label_object: String,
    update_interval: f64,
    #[serde(default)]
    timeout: Option<f64>,
    #[serde(default)]
    use_encryption: bool,
    #[serde(default)]
    use_pass: bool,
    #[serde(default)]
    certificate_path: String,
    #[serde(default)]
    private_key_path: String,
    #[serde(default)]
    security_policy: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl LegacyConfig {
    /// Returns `true` if a JSON document uses the flat layout.
    pub fn matches(document: &serde_json::Value) -> bool {
        document.get(MARKER_KEY).is_some()
    }

    /// Converts to the structured configuration.
    pub fn into_bridge_config(self) -> ConfigResult<BridgeConfig> {
        if let Some(timeout) = self.timeout {
            debug!(timeout, "Legacy 'timeout' has no effect and is ignored");
        }

        let security_policy = match non_empty(self.security_policy) {
            Some(name) => name.parse()?,
            None => Default::default(),
        };

        Ok(BridgeConfig {
            server: ServerConfig {
                endpoint: self.server_endpoint,
                namespace_uri: self.namespace_uri,
                object_label: self.label_object,
                health_tag: DEFAULT_HEALTH_TAG.to_string(),
                publishing_interval_ms: DEFAULT_PUBLISHING_INTERVAL_MS,
                application_name: "nxbridge".to_string(),
            },
            controller: ControllerConfig {
                ip_address: self.plc_ip_address,
                poll_interval_secs: self.update_interval,
                reconnect_backoff_secs: DEFAULT_RECONNECT_BACKOFF_SECS,
                backend: ControllerBackend::default(),
            },
            security: SecurityConfig {
                encryption: EncryptionConfig {
                    enabled: self.use_encryption,
                    certificate_path: non_empty(self.certificate_path).map(PathBuf::from),
                    private_key_path: non_empty(self.private_key_path).map(PathBuf::from),
                    security_policy,
                },
                authentication: AuthenticationConfig {
                    enabled: self.use_pass,
                    username: non_empty(self.username),
                    password: non_empty(self.password).map(SecretValue::new),
                },
            },
            tags_path: self.json_config_path,
            logging: LoggingConfig::default(),
        })
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SecurityMode, SecurityPolicy};
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "plc_ip_address": "192.168.250.1",
            "server_endpoint": "opc.tcp://0.0.0.0:4840/freeopcua/server/",
            "namespace_uri": "urn:plant:line1",
            "json_config_path": "config_plc.json",
            "label_Object": "PLC",
            "update_interval": 0.5,
            "timeout": 5,
            "use_encryption": true,
            "use_pass": true,
            "certificate_path": "certs/server.der",
            "private_key_path": "certs/server.pem",
            "security_policy": "Basic256Sha256_SignAndEncrypt",
            "username": "operator",
            "password": "s3cret"
        })
    }

    #[test]
    fn test_detection() {
        assert!(LegacyConfig::matches(&document()));
        assert!(!LegacyConfig::matches(&json!({ "server": {} })));
    }

    #[test]
    fn test_conversion() {
        let legacy: LegacyConfig = serde_json::from_value(document()).unwrap();
        let config = legacy.into_bridge_config().unwrap();

        assert_eq!(config.controller.poll_interval_secs, 0.5);
        assert_eq!(config.tags_path, PathBuf::from("config_plc.json"));
        assert_eq!(config.server.health_tag, "COM_PLC_FAIL");
        assert_eq!(
            config.security.encryption.security_policy.policy,
            SecurityPolicy::Basic256Sha256
        );
        assert_eq!(
            config.security.encryption.security_policy.mode,
            SecurityMode::SignAndEncrypt
        );
        assert_eq!(
            config.security.authentication.username.as_deref(),
            Some("operator")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_strings_are_unset() {
        let mut document = document();
        document["use_encryption"] = json!(false);
        document["certificate_path"] = json!("");
        document["security_policy"] = json!("");
        let legacy: LegacyConfig = serde_json::from_value(document).unwrap();
        let config = legacy.into_bridge_config().unwrap();

        assert!(config.security.encryption.certificate_path.is_none());
        assert_eq!(
            config.security.encryption.security_policy.policy,
            SecurityPolicy::None
        );
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let mut document = document();
        document["security_policy"] = json!("Basic512");
        let legacy: LegacyConfig = serde_json::from_value(document).unwrap();
        assert!(legacy.into_bridge_config().is_err());
    }
}
