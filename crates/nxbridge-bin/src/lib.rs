// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # nxbridge-bin
//!
//! CLI binary for the nxbridge controller ↔ OPC UA bridge.
//!
//! This crate provides:
//!
//! - CLI argument parsing with clap
//! - Bridge runtime orchestration
//! - Graceful shutdown handling
//! - Logging initialization
//! - Command implementations (run, validate, version)
//!
//! ## Architecture
//!
//! ```text
//!                     main.rs
//!                        │
//!                     cli.rs
//!                        │
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!      commands       runtime       logging
//!                        │
//!              ┌─────────┼─────────┐
//!              ▼         ▼         ▼
//!          shutdown  SyncEngine  NodePublisher
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the bridge (default command)
//! nxbridge
//!
//! # Start with a custom config
//! nxbridge -c /etc/nxbridge/config_server.json
//!
//! # Validate configuration and tag file
//! nxbridge validate --strict
//!
//! # Show version
//! nxbridge version
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{server_settings, BridgeRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownGuard};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
