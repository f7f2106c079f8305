// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server settings.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::CredentialChecker;

/// Default OPC UA TCP port.
pub const DEFAULT_PORT: u16 = 4840;

/// Default subscription publishing interval.
pub const DEFAULT_PUBLISHING_INTERVAL: Duration = Duration::from_millis(1000);

// =============================================================================
// Security
// =============================================================================

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityPolicy {
    /// Basic128Rsa15.
    Basic128Rsa15,
    /// Basic256.
    Basic256,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128-Sha256-RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256-Sha256-RsaPss.
    Aes256Sha256RsaPss,
}

/// Message security mode of a secured endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityMode {
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

/// Endpoint security.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EndpointSecurity {
    /// Plain endpoint.
    #[default]
    None,
    /// Signed or encrypted endpoint with the server's key pair.
    Secured {
        /// Security policy.
        policy: SecurityPolicy,
        /// Message security mode.
        mode: SecurityMode,
        /// Server certificate.
        certificate_path: PathBuf,
        /// Server private key.
        private_key_path: PathBuf,
    },
}

impl EndpointSecurity {
    /// Returns `true` for a signed or encrypted endpoint.
    pub fn is_secured(&self) -> bool {
        matches!(self, Self::Secured { .. })
    }
}

impl fmt::Display for EndpointSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Secured { policy, mode, .. } => write!(f, "{:?}/{:?}", policy, mode),
        }
    }
}

// =============================================================================
// ServerSettings
// =============================================================================

/// Everything needed to bring up the address space.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Application name announced to clients.
    pub application_name: String,
    /// Application URI.
    pub application_uri: String,
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Endpoint path, starting with `/`.
    pub path: String,
    /// Endpoint security.
    pub security: EndpointSecurity,
    /// Accepted client credentials.
    pub credentials: CredentialChecker,
    /// Interval at which subscribed nodes are sampled.
    pub publishing_interval: Duration,
    /// PKI directory for trusted and rejected client certificates.
    pub pki_dir: PathBuf,
}

impl ServerSettings {
    /// Creates settings for an anonymous, unsecured endpoint.
    pub fn new(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            application_name: "nxbridge".to_string(),
            application_uri: "urn:nxbridge".to_string(),
            host: host.into(),
            port,
            path: path.into(),
            security: EndpointSecurity::None,
            credentials: CredentialChecker::disabled(),
            publishing_interval: DEFAULT_PUBLISHING_INTERVAL,
            pki_dir: PathBuf::from("pki"),
        }
    }

    /// Returns the endpoint URL.
    pub fn endpoint_url(&self) -> String {
        format!("opc.tcp://{}:{}{}", self.host, self.port, self.path)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::new("0.0.0.0", DEFAULT_PORT, "/")
    }
}
