// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration error types for nxbridge-config.
//!
//! Every variant is fatal: configuration is loaded once before startup and
//! the process exits if it cannot be loaded.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse a configuration or tag file.
    #[error("Failed to parse '{path}': {message}")]
    Parse {
        /// Path to the file.
        path: PathBuf,
        /// Error message.
        message: String,
        /// Line number (if available).
        line: Option<usize>,
    },

    /// Configuration validation failed.
    #[error("Validation failed for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// The missing field name.
        field: String,
    },

    /// File I/O error.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A tag definition is invalid.
    #[error("Invalid tag '{tag}': {message}")]
    InvalidTag {
        /// The tag name.
        tag: String,
        /// Error message.
        message: String,
    },

    /// The same tag name appears twice.
    #[error("Duplicate tag name: {tag}")]
    DuplicateTag {
        /// The duplicated name.
        tag: String,
    },

    /// The declared type name is not supported.
    #[error("Unsupported data type '{type_name}' for tag '{tag}'")]
    UnsupportedType {
        /// The tag name.
        tag: String,
        /// The type name found in the file.
        type_name: String,
    },

    /// Environment variable not found.
    #[error("Environment variable not found: {name}")]
    EnvVarNotFound {
        /// The environment variable name.
        name: String,
    },

    /// Invalid environment variable value.
    #[error("Invalid environment variable value for '{name}': {message}")]
    InvalidEnvVar {
        /// The environment variable name.
        name: String,
        /// Error message.
        message: String,
    },

    /// File not found.
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Value out of range.
    #[error("Value out of range for '{field}': {value} (expected {min}..{max})")]
    OutOfRange {
        /// The field name.
        field: String,
        /// The actual value.
        value: String,
        /// Minimum value.
        min: String,
        /// Maximum value.
        max: String,
    },

    /// Unsupported configuration format.
    #[error("Unsupported configuration format: {format}")]
    UnsupportedFormat {
        /// The unsupported format.
        format: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    /// Creates a parse error with line number.
    pub fn parse_at_line(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
            line: Some(line),
        }
    }

    /// Creates a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    /// Creates an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid tag error.
    pub fn invalid_tag(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Creates a duplicate tag error.
    pub fn duplicate_tag(tag: impl Into<String>) -> Self {
        Self::DuplicateTag { tag: tag.into() }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(tag: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            tag: tag.into(),
            type_name: type_name.into(),
        }
    }

    /// Creates an environment variable not found error.
    pub fn env_var_not_found(name: impl Into<String>) -> Self {
        Self::EnvVarNotFound { name: name.into() }
    }

    /// Creates an invalid environment variable error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an out of range error.
    pub fn out_of_range<T: std::fmt::Display>(
        field: impl Into<String>,
        value: T,
        min: T,
        max: T,
    ) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        }
    }

    /// Creates an unsupported format error.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is related to file I/O.
    pub fn is_io_error(&self) -> bool {
        matches!(self, ConfigError::Io { .. } | ConfigError::FileNotFound { .. })
    }

    /// Returns `true` if this error comes from the tag definition file.
    pub fn is_tag_error(&self) -> bool {
        matches!(
            self,
            ConfigError::InvalidTag { .. }
                | ConfigError::DuplicateTag { .. }
                | ConfigError::UnsupportedType { .. }
        )
    }

    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConfigError::Parse { .. } => "parse",
            ConfigError::Validation { .. } => "validation",
            ConfigError::MissingField { .. } => "missing_field",
            ConfigError::Io { .. } => "io",
            ConfigError::InvalidTag { .. } => "invalid_tag",
            ConfigError::DuplicateTag { .. } => "duplicate_tag",
            ConfigError::UnsupportedType { .. } => "unsupported_type",
            ConfigError::EnvVarNotFound { .. } => "env_var_not_found",
            ConfigError::InvalidEnvVar { .. } => "invalid_env_var",
            ConfigError::FileNotFound { .. } => "file_not_found",
            ConfigError::OutOfRange { .. } => "out_of_range",
            ConfigError::UnsupportedFormat { .. } => "unsupported_format",
            ConfigError::Serialization { .. } => "serialization",
        }
    }
}

/// A Result type with ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creation() {
        let error = ConfigError::validation("controller.ip_address", "must not be empty");
        assert!(matches!(error, ConfigError::Validation { .. }));
        assert_eq!(error.error_type(), "validation");

        let error = ConfigError::unsupported_type("Speed", "lreal");
        assert!(error.is_tag_error());
        assert_eq!(
            error.to_string(),
            "Unsupported data type 'lreal' for tag 'Speed'"
        );
    }

    #[test]
    fn test_config_error_is_io_error() {
        let error = ConfigError::io(
            "nxbridge.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(error.is_io_error());
        assert!(ConfigError::file_not_found("tags.json").is_io_error());
        assert!(!ConfigError::missing_field("tags_path").is_io_error());
    }

    #[test]
    fn test_parse_at_line() {
        let error = ConfigError::parse_at_line("tags.json", "expected value", 3);
        match error {
            ConfigError::Parse { line, .. } => assert_eq!(line, Some(3)),
            _ => panic!("Expected Parse error"),
        }
    }

    #[test]
    fn test_out_of_range() {
        let error = ConfigError::out_of_range("controller.poll_interval_secs", 0.0, 0.001, 3600.0);
        assert!(error.to_string().contains("controller.poll_interval_secs"));
    }
}
