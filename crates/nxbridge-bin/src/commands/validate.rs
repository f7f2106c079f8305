// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use std::path::{Path, PathBuf};

use nxbridge_config::{load_config, BridgeConfig, SecretValue, TagDefinitions};

use crate::cli::{Cli, LogFormat, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    init_logging(
        cli.effective_log_level("warn"),
        cli.effective_log_format(LogFormat::Text),
    )?;

    let report = ValidationReport::build(&cli.config)?;
    match args.format {
        OutputFormat::Text => report.print_text(args.show_config)?,
        OutputFormat::Json => report.print_json(args.show_config)?,
    }
    report.check_strict(args.strict)
}

/// Outcome of loading a configuration and its tag file.
struct ValidationReport {
    config_path: PathBuf,
    config: BridgeConfig,
    tags: TagDefinitions,
    warnings: Vec<String>,
}

impl ValidationReport {
    fn build(config_path: &Path) -> BinResult<Self> {
        let config = load_config(config_path).map_err(|e| {
            BinError::from(e).with_context("Configuration validation failed")
        })?;
        let tags = TagDefinitions::load(&config.tags_path, &config.server.health_tag)
            .map_err(|e| BinError::from(e).with_context("Tag definition file is invalid"))?;

        let mut warnings = config.warnings();
        if tags.is_empty() {
            warnings.push("tag definition file declares no tags".to_string());
        }
        let encryption = &config.security.encryption;
        if encryption.enabled {
            for path in [&encryption.certificate_path, &encryption.private_key_path]
                .into_iter()
                .flatten()
            {
                if !path.exists() {
                    warnings.push(format!("file not found: {}", path.display()));
                }
            }
        }

        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            tags,
            warnings,
        })
    }

    fn check_strict(&self, strict: bool) -> BinResult<()> {
        if strict && !self.warnings.is_empty() {
            return Err(BinError::config(format!(
                "Strict mode: {} warning(s) found",
                self.warnings.len()
            )));
        }
        Ok(())
    }

    /// The configuration with secrets masked.
    fn redacted_config(&self) -> BridgeConfig {
        let mut config = self.config.clone();
        if let Some(password) = config.security.authentication.password.as_mut() {
            *password = SecretValue::new("********");
        }
        config
    }

    fn print_text(&self, show_config: bool) -> BinResult<()> {
        let config = &self.config;
        let encryption = &config.security.encryption;

        println!("✓ Configuration is valid: {}", self.config_path.display());
        println!();
        println!("Summary:");
        println!("  Endpoint:       {}", config.server.endpoint);
        println!("  Namespace:      {}", config.server.namespace_uri);
        println!("  Object:         {}", config.server.object_label);
        println!("  Health node:    {}", config.server.health_tag);
        println!(
            "  Controller:     {} ({})",
            config.controller.ip_address, config.controller.backend
        );
        println!("  Poll interval:  {} s", config.controller.poll_interval_secs);
        println!(
            "  Tags:           {} ({} writable)",
            self.tags.len(),
            self.tags.writable_count()
        );
        println!(
            "  Encryption:     {}",
            if encryption.enabled {
                encryption.security_policy.to_string()
            } else {
                "disabled".to_string()
            }
        );
        println!(
            "  Authentication: {}",
            if config.security.authentication.enabled { "enabled" } else { "disabled" }
        );

        if !self.warnings.is_empty() {
            println!();
            println!("Warnings:");
            for warning in &self.warnings {
                println!("  ⚠ {}", warning);
            }
        }

        if show_config {
            println!();
            println!("Parsed configuration:");
            println!("{}", to_pretty_json(&self.redacted_config())?);
        }
        Ok(())
    }

    fn print_json(&self, show_config: bool) -> BinResult<()> {
        println!("{}", to_pretty_json(&self.to_json(show_config))?);
        Ok(())
    }

    fn to_json(&self, show_config: bool) -> serde_json::Value {
        let config = &self.config;
        let tags: Vec<_> = self
            .tags
            .iter()
            .map(|tag| {
                serde_json::json!({
                    "name": tag.name(),
                    "type": tag.data_type().as_str(),
                    "writable": tag.is_writable(),
                    "initial_value": tag.initial_value().to_json(),
                })
            })
            .collect();

        serde_json::json!({
            "valid": true,
            "config_path": self.config_path.display().to_string(),
            "summary": {
                "endpoint": config.server.endpoint,
                "namespace_uri": config.server.namespace_uri,
                "object_label": config.server.object_label,
                "health_tag": config.server.health_tag,
                "controller_ip": config.controller.ip_address,
                "poll_interval_secs": config.controller.poll_interval_secs,
                "encryption_enabled": config.security.encryption.enabled,
                "authentication_enabled": config.security.authentication.enabled,
                "tag_count": self.tags.len(),
                "writable_count": self.tags.writable_count(),
            },
            "tags": tags,
            "warnings": self.warnings,
            "config": if show_config { Some(self.redacted_config()) } else { None },
        })
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> BinResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| BinError::runtime(format!("Failed to render output: {}", e)))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_files(dir: &Path, tags: &str, security: &str) -> PathBuf {
        fs::write(dir.join("config_plc.json"), tags).unwrap();
        let config = format!(
            r#"{{
                "server": {{
                    "endpoint": "opc.tcp://0.0.0.0:4840/freeopcua/server/",
                    "namespace_uri": "urn:plant:line1"
                }},
                "controller": {{ "ip_address": "192.168.250.1" }},
                "security": {security},
                "tags_path": "config_plc.json"
            }}"#
        );
        let path = dir.join("nxbridge.json");
        fs::write(&path, config).unwrap();
        path
    }

    const SECURED: &str = r#"{
        "authentication": { "enabled": true, "username": "operator", "password": "s3cret" },
        "encryption": {
            "enabled": true,
            "certificate_path": "server.der",
            "private_key_path": "server.pem",
            "security_policy": "Basic256Sha256_SignAndEncrypt"
        }
    }"#;

    #[test]
    fn test_report_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(
            dir.path(),
            r#"{ "Speed": { "value": 10, "write": true }, "Label": { "value": "A", "write": false } }"#,
            "{}",
        );

        let report = ValidationReport::build(&path).unwrap();
        let json = report.to_json(false);

        assert_eq!(json["summary"]["tag_count"], 2);
        assert_eq!(json["summary"]["writable_count"], 1);
        assert_eq!(json["tags"][0]["name"], "Speed");
        assert_eq!(json["tags"][0]["type"], "int32");
        assert!(json["config"].is_null());
        // Encryption and authentication are both off.
        assert_eq!(json["warnings"].as_array().unwrap().len(), 2);
        assert!(report.check_strict(false).is_ok());
        assert_eq!(report.check_strict(true).unwrap_err().exit_code(), 1);
    }

    #[test]
    fn test_secured_config_missing_files_warn() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(dir.path(), r#"{ "Speed": { "value": 1, "write": true } }"#, SECURED);

        let report = ValidationReport::build(&path).unwrap();
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|w| w.starts_with("file not found")));

        fs::write(dir.path().join("server.der"), b"cert").unwrap();
        fs::write(dir.path().join("server.pem"), b"key").unwrap();
        let report = ValidationReport::build(&path).unwrap();
        assert!(report.warnings.is_empty());
        assert!(report.check_strict(true).is_ok());
    }

    #[test]
    fn test_shown_config_is_redacted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(dir.path(), r#"{ "Speed": { "value": 1, "write": true } }"#, SECURED);

        let report = ValidationReport::build(&path).unwrap();
        let rendered = report.to_json(true).to_string();
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("operator"));
    }

    #[test]
    fn test_invalid_tag_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_files(dir.path(), r#"{ "Speed": { "value": [1], "write": true } }"#, "{}");

        let err = ValidationReport::build(&path).err().unwrap();
        assert_eq!(err.exit_code(), 1);
    }
}
