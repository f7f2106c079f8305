// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # nxbridge-config
//!
//! Configuration management for the nxbridge controller ↔ OPC UA bridge.
//!
//! ## Features
//!
//! - **Schema Definition**: server, controller, security and logging settings
//! - **Multi-Format Support**: YAML, TOML and JSON configuration files
//! - **Legacy Layout**: the flat `config_server.json` document is accepted
//! - **Environment Overrides**: override values via `NXBRIDGE_*` variables
//! - **Tag Definitions**: the JSON tag file, with type inference
//!
//! ## Quick Start
//!
//! ```no_run
//! use nxbridge_config::{load_config, TagDefinitions};
//!
//! let config = load_config("nxbridge.yaml").unwrap();
//! let tags = TagDefinitions::load(&config.tags_path, &config.server.health_tag).unwrap();
//!
//! println!("Controller: {}", config.controller.ip_address);
//! println!("Tags: {}", tags.len());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod legacy;
pub mod loader;
pub mod schema;
pub mod tags;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};

pub use schema::{
    AuthenticationConfig, BridgeConfig, ControllerBackend, ControllerConfig, EncryptionConfig,
    EndpointUrl, LogFormat, LogLevel, LoggingConfig, SecretValue, SecurityConfig, SecurityMode,
    SecurityPolicy, SecurityPolicyName, ServerConfig,
};

pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, ConfigLoaderBuilder};

pub use legacy::LegacyConfig;
pub use tags::TagDefinitions;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");

// =============================================================================
// Prelude
// =============================================================================

/// Convenience re-exports for common use cases.
pub mod prelude {
    pub use crate::error::{ConfigError, ConfigResult};
    pub use crate::loader::{load_config, ConfigLoader};
    pub use crate::schema::{BridgeConfig, SecretValue};
    pub use crate::tags::TagDefinitions;
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "nxbridge-config");
    }
}
