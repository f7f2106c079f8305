// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # nxbridge-core
//!
//! Synchronization core of the nxbridge controller ↔ OPC UA bridge.
//!
//! This crate provides:
//!
//! - **Types**: the dynamic [`Value`] model and declared [`DataType`]s
//! - **Error**: the error taxonomy, classified by [`ErrorKind`]
//! - **Registry**: tag descriptors and the tag ↔ node mapping
//! - **Controller**: the [`ControllerSession`] transport trait and the
//!   [`ControllerGateway`] that owns the single session
//! - **Publisher**: the [`NodePublisher`] address space trait
//! - **Engine**: the poll loop, change notifier and reconnect supervisor
//! - **Simulated**: an in-memory controller for tests and dry runs
//! - **EtherNet/IP** (feature `eip`): the [`EipSession`](eip::EipSession)
//!   explicit-messaging transport
//!
//! ## Example
//!
//! ```rust,ignore
//! use nxbridge_core::{ControllerGateway, EngineConfig, SimulatedController, SyncEngine};
//!
//! let controller = SimulatedController::seeded(registry.iter());
//! let gateway = ControllerGateway::new(Box::new(controller.session()), "192.168.250.1");
//! let engine = SyncEngine::new(registry, publisher, gateway, health, EngineConfig::default());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod registry;
pub mod types;

// =============================================================================
// Boundary Modules
// =============================================================================

pub mod controller;
pub mod publisher;
pub mod simulated;

#[cfg(feature = "eip")]
pub mod eip;

// =============================================================================
// Synchronization Modules
// =============================================================================

pub mod engine;
pub mod retry;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

pub use controller::{format_tag_value, ConnectionState, ControllerGateway, ControllerSession};
pub use engine::{
    expose_tags, AddressSpaceLayout, ChangeOutcome, CycleOutcome, EngineConfig,
    EngineStatsSnapshot, ExposedNodes, SyncEngine, DEFAULT_HEALTH_TAG,
};
pub use publisher::{
    ChangeCallback, ChangeNotification, DataValue, NodeHandle, NodePublisher,
    NotificationPayload,
};
pub use registry::{TagDescriptor, TagRegistry};
pub use retry::{FixedDelay, RetryDecision, DEFAULT_RECONNECT_BACKOFF};
pub use simulated::{SimulatedController, SimulatedSession};

#[cfg(feature = "eip")]
pub use eip::EipSession;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
