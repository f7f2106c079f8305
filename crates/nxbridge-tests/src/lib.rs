// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # nxbridge Integration Tests
//!
//! Cross-crate tests for the nxbridge synchronization engine, configuration
//! loading and the in-memory address space, plus the utilities they share.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: tag sets and configuration files
//!   - `mocks`: a scriptable controller session and a recording publisher
//!   - `harness`: an engine wired to both mocks
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p nxbridge-tests
//! cargo test -p nxbridge-tests --test integration_sync
//! cargo test -p nxbridge-tests --test integration_config
//! cargo test -p nxbridge-tests --test integration_address_space
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use nxbridge_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let mut harness = BridgeHarness::new(TagFixtures::standard_set());
//!     harness.start().await;
//!     harness.publisher.client_write("Speed", 15).unwrap();
//!     let outcomes = harness.pump().await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::init_test_logging;
}
