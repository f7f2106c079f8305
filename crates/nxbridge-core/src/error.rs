// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error hierarchy for nxbridge.
//!
//! Controller failures are classified by kind rather than by message text,
//! so callers branch on [`ControllerError::kind`] instead of inspecting
//! strings.
//!
//! # Error Hierarchy
//!
//! ```text
//! BridgeError (root)
//! ├── ControllerError  - Controller session and tag operations
//! │   ├── Connectivity - Transport lost, refused or timed out (reconnect)
//! │   ├── NotConnected - Session not established yet / reconnecting
//! │   ├── Protocol     - Session negotiation failure (reconnect mid-run)
//! │   ├── Tag          - Tag unknown, unreadable or rejected by the controller
//! │   └── Validation   - Value not representable as the declared type
//! ├── PublisherError   - Address space operations
//! └── RegistryError    - Tag registry construction and node binding
//! ```
//!
//! # Examples
//!
//! ```
//! use std::io;
//! use nxbridge_core::error::{ControllerError, ErrorKind};
//!
//! let error = ControllerError::from_io(io::Error::from(io::ErrorKind::ConnectionReset));
//! assert_eq!(error.kind(), ErrorKind::Connectivity);
//! assert!(error.triggers_reconnect());
//!
//! let error = ControllerError::tag("Speed", "path destination unknown");
//! assert!(!error.triggers_reconnect());
//! ```

use std::fmt;
use std::io;

use thiserror::Error;

use crate::types::{DataType, Value};

// =============================================================================
// BridgeError - Root Error Type
// =============================================================================

/// The root error type for nxbridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Controller error.
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerError),

    /// Node publisher error.
    #[error("Publisher error: {0}")]
    Publisher(#[from] PublisherError),

    /// Tag registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl BridgeError {
    /// Returns the error type as a string for logging.
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::Controller(_) => "controller",
            BridgeError::Publisher(_) => "publisher",
            BridgeError::Registry(_) => "registry",
        }
    }
}

// =============================================================================
// ErrorKind
// =============================================================================

/// Classification of a controller failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The link to the controller is down. Recovered by reconnecting.
    Connectivity,
    /// Session negotiation failed. Fatal at startup, reconnect mid-run.
    Protocol,
    /// A single tag failed. Logged and skipped.
    Tag,
    /// A value was rejected before reaching the controller.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connectivity => write!(f, "connectivity"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Tag => write!(f, "tag"),
            ErrorKind::Validation => write!(f, "validation"),
        }
    }
}

// =============================================================================
// ControllerError
// =============================================================================

/// Controller session errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The transport failed (reset, refused, timed out, unreachable).
    #[error("Connection to controller lost: {message}")]
    Connectivity {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No session is established.
    #[error("Controller session is not connected")]
    NotConnected,

    /// Session negotiation or registration failed.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Error message.
        message: String,
    },

    /// The controller could not read or refused to write a tag.
    #[error("Tag '{tag}' failed: {message}")]
    Tag {
        /// The tag name.
        tag: String,
        /// Error message.
        message: String,
    },

    /// The value does not match the tag's declared type or permissions.
    #[error("Invalid value for tag '{tag}': {message}")]
    Validation {
        /// The tag name.
        tag: String,
        /// Error message.
        message: String,
    },
}

impl ControllerError {
    /// Creates a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a connectivity error with a source.
    pub fn connectivity_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connectivity {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a tag error.
    pub fn tag(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tag {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Creates a validation error for a value that does not fit the declared type.
    pub fn type_mismatch(tag: impl Into<String>, expected: DataType, actual: &Value) -> Self {
        Self::validation(
            tag,
            format!(
                "{} value {} is not representable as {}",
                actual.type_name(),
                actual,
                expected
            ),
        )
    }

    /// Classifies an I/O error from a controller transport.
    ///
    /// Transport-level failures map to [`ErrorKind::Connectivity`]; malformed
    /// data maps to [`ErrorKind::Protocol`]. Anything else is treated as a
    /// connectivity failure, since the session state is unknown afterwards.
    pub fn from_io(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => Self::Protocol {
                message: error.to_string(),
            },
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::AddrNotAvailable => {
                let message = format!("{:?}", error.kind());
                Self::connectivity_with(message, error)
            }
            _ => {
                let message = error.to_string();
                Self::connectivity_with(message, error)
            }
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } | Self::NotConnected => ErrorKind::Connectivity,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Tag { .. } => ErrorKind::Tag,
            Self::Validation { .. } => ErrorKind::Validation,
        }
    }

    /// Returns `true` if this error means the session must be re-established.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connectivity | ErrorKind::Protocol)
    }

    /// Returns `true` if the failure is confined to a single tag.
    pub fn is_tag_scoped(&self) -> bool {
        matches!(self.kind(), ErrorKind::Tag | ErrorKind::Validation)
    }
}

impl From<io::Error> for ControllerError {
    fn from(error: io::Error) -> Self {
        Self::from_io(error)
    }
}

// =============================================================================
// PublisherError
// =============================================================================

/// Address space (node publisher) errors.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// Namespace registration failed.
    #[error("Failed to register namespace '{uri}': {message}")]
    Namespace {
        /// Namespace URI.
        uri: String,
        /// Error message.
        message: String,
    },

    /// Node creation failed.
    #[error("Failed to create node '{name}': {message}")]
    NodeCreation {
        /// Browse name of the node.
        name: String,
        /// Error message.
        message: String,
    },

    /// The node does not exist in the address space.
    #[error("Unknown node: {node}")]
    UnknownNode {
        /// The node identifier.
        node: String,
    },

    /// The value does not match the node's data type.
    #[error("Type mismatch on node '{node}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The node identifier.
        node: String,
        /// Declared type.
        expected: DataType,
        /// Actual value type name.
        actual: &'static str,
    },

    /// A client wrote to a read-only node.
    #[error("Node '{node}' is not writable")]
    NotWritable {
        /// The node identifier.
        node: String,
    },

    /// The client was not admitted.
    #[error("Access denied: {reason}")]
    AccessDenied {
        /// Why the client was rejected.
        reason: String,
    },

    /// The server runtime failed.
    #[error("Server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },
}

impl PublisherError {
    /// Creates a node creation error.
    pub fn node_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown node error.
    pub fn unknown_node(node: impl fmt::Display) -> Self {
        Self::UnknownNode {
            node: node.to_string(),
        }
    }

    /// Creates a type mismatch error for a value.
    pub fn type_mismatch(node: impl fmt::Display, expected: DataType, value: &Value) -> Self {
        Self::TypeMismatch {
            node: node.to_string(),
            expected,
            actual: value.type_name(),
        }
    }

    /// Creates a not writable error.
    pub fn not_writable(node: impl fmt::Display) -> Self {
        Self::NotWritable {
            node: node.to_string(),
        }
    }

    /// Creates a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

// =============================================================================
// RegistryError
// =============================================================================

/// Tag registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Two tags share a name.
    #[error("Duplicate tag name: {name}")]
    DuplicateTag {
        /// The duplicated name.
        name: String,
    },

    /// The tag is not registered.
    #[error("Unknown tag: {name}")]
    UnknownTag {
        /// The missing name.
        name: String,
    },

    /// The tag or node is already bound.
    #[error("Tag '{name}' is already bound to node {node}")]
    AlreadyBound {
        /// The tag name.
        name: String,
        /// The existing node.
        node: String,
    },
}

/// Result type for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Result type for publisher operations.
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Result type for operations spanning the whole bridge.
pub type BridgeResult<T> = Result<T, BridgeError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        for kind in [
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut,
            io::ErrorKind::BrokenPipe,
        ] {
            let error = ControllerError::from_io(io::Error::from(kind));
            assert_eq!(error.kind(), ErrorKind::Connectivity, "{:?}", kind);
        }

        let error = ControllerError::from_io(io::Error::from(io::ErrorKind::InvalidData));
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_reconnect_classification() {
        assert!(ControllerError::connectivity("reset").triggers_reconnect());
        assert!(ControllerError::NotConnected.triggers_reconnect());
        assert!(ControllerError::protocol("register session").triggers_reconnect());
        assert!(!ControllerError::tag("Speed", "unknown").triggers_reconnect());
        assert!(!ControllerError::validation("Speed", "type").triggers_reconnect());
        assert!(ControllerError::tag("Speed", "unknown").is_tag_scoped());
    }

    #[test]
    fn test_type_mismatch_message() {
        let error = ControllerError::type_mismatch("Speed", DataType::Int32, &Value::from("fast"));
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!(
            error.to_string(),
            "Invalid value for tag 'Speed': string value fast is not representable as int32"
        );
    }

    #[test]
    fn test_bridge_error_conversion() {
        let error: BridgeError = ControllerError::NotConnected.into();
        assert_eq!(error.error_type(), "controller");

        let error: BridgeError = PublisherError::server("bind failed").into();
        assert_eq!(error.to_string(), "Publisher error: Server error: bind failed");
    }
}
