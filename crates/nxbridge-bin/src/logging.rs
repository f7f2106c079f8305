// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logging and tracing initialization.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;
use crate::error::{BinError, BinResult};

/// Directives applied on top of the requested level.
const DEPENDENCY_DIRECTIVES: &[&str] = &["opcua=warn", "tokio=info"];

// =============================================================================
// Logging Initialization
// =============================================================================

/// Initializes the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Fails on an unparseable level or
/// when a subscriber is already installed.
///
/// # Example
///
/// ```ignore
/// use nxbridge_bin::cli::LogFormat;
/// use nxbridge_bin::logging::init_logging;
///
/// init_logging("info", LogFormat::Text)?;
/// ```
pub fn init_logging(level: &str, format: LogFormat) -> BinResult<()> {
    let filter = build_filter(level)?;

    let result = match format {
        LogFormat::Text => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .with_ansi(is_terminal),
                )
                .try_init()
        }
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Compact => {
            let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_ansi(is_terminal),
                )
                .try_init()
        }
    };

    result.map_err(|e| BinError::init(format!("Failed to install log subscriber: {}", e)))
}

/// Builds the level filter.
fn build_filter(level: &str) -> BinResult<EnvFilter> {
    let mut filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| BinError::config(format!("Invalid log level '{}': {}", level, e)))?,
    };

    for directive in DEPENDENCY_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_levels() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("nxbridge_core=trace,info").is_ok());
    }

    #[test]
    fn test_invalid_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let err = build_filter("nxbridge_core=loud").unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
