// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA address space backends for nxbridge.
//!
//! Two [`NodePublisher`] implementations are provided:
//!
//! - [`InMemoryAddressSpace`]: the address space without a network listener.
//!   Used by tests, dry runs and builds without the `opcua-server` feature.
//! - `OpcUaServer` (feature `opcua-server`): a real `opc.tcp` server built on
//!   the `opcua` crate.
//!
//! Use [`build_publisher`] to get the backend this build supports.
//!
//! # Example
//!
//! ```rust,ignore
//! use nxbridge_opcua::{build_publisher, ServerSettings};
//!
//! let publisher = build_publisher(ServerSettings::new("0.0.0.0", 4840, "/"))?;
//! let ns = publisher.register_namespace("urn:plant:line1")?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;

use nxbridge_core::{NodePublisher, PublisherResult};

pub mod address_space;
pub mod auth;
pub mod settings;

#[cfg(feature = "opcua-server")]
pub mod server;

pub use address_space::{ClientSession, InMemoryAddressSpace, VariableSnapshot};
pub use auth::{ClientIdentity, CredentialChecker};
pub use settings::{EndpointSecurity, SecurityMode, SecurityPolicy, ServerSettings};

#[cfg(feature = "opcua-server")]
pub use server::OpcUaServer;

/// Builds the node publisher for these settings.
#[cfg(feature = "opcua-server")]
pub fn build_publisher(settings: ServerSettings) -> PublisherResult<Arc<dyn NodePublisher>> {
    Ok(Arc::new(OpcUaServer::new(settings)?))
}

/// Builds the node publisher for these settings.
///
/// Without the `opcua-server` feature no listener is bound; the address
/// space lives in memory only.
#[cfg(not(feature = "opcua-server"))]
pub fn build_publisher(settings: ServerSettings) -> PublisherResult<Arc<dyn NodePublisher>> {
    tracing::warn!(
        endpoint = %settings.endpoint_url(),
        "Built without the opcua-server feature; endpoint is not bound"
    );
    Ok(Arc::new(InMemoryAddressSpace::new(settings.credentials)))
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "opcua-server"))]
    #[test]
    fn test_default_backend() {
        let publisher = build_publisher(ServerSettings::default()).unwrap();
        assert_eq!(publisher.describe(), "in-memory address space");
    }
}
