// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnect backoff policy.
//!
//! The reconnect supervisor retries with a fixed, non-exponential delay and,
//! by default, never gives up.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

// =============================================================================
// Retry Decision
// =============================================================================

/// Decision on whether to retry an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// Do not retry, return the error.
    DoNotRetry,
}

// =============================================================================
// Fixed Delay Strategy
// =============================================================================

/// A strategy that waits a fixed duration between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// Creates a strategy that retries forever.
    pub fn indefinite(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Creates a strategy that gives up after `max_attempts` attempts.
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts),
        }
    }

    /// Returns the delay between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Determines whether to retry after a failed attempt.
    ///
    /// `attempt` is 1-based. Only errors that call for a new session are
    /// retried; tag and validation errors are returned to the caller.
    pub fn should_retry(&self, error: &ControllerError, attempt: u32) -> RetryDecision {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return RetryDecision::DoNotRetry;
            }
        }
        if !error.triggers_reconnect() {
            return RetryDecision::DoNotRetry;
        }
        RetryDecision::Retry(self.delay)
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::indefinite(DEFAULT_RECONNECT_BACKOFF)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indefinite_retries_connectivity() {
        let strategy = FixedDelay::default();
        let error = ControllerError::connectivity("refused");
        for attempt in [1, 10, 10_000] {
            assert_eq!(
                strategy.should_retry(&error, attempt),
                RetryDecision::Retry(Duration::from_secs(3))
            );
        }
    }

    #[test]
    fn test_bounded() {
        let strategy = FixedDelay::bounded(Duration::from_millis(100), 3);
        let error = ControllerError::protocol("register failed");
        assert!(matches!(strategy.should_retry(&error, 2), RetryDecision::Retry(_)));
        assert_eq!(strategy.should_retry(&error, 3), RetryDecision::DoNotRetry);
    }

    #[test]
    fn test_tag_errors_not_retried() {
        let strategy = FixedDelay::default();
        let error = ControllerError::tag("Speed", "unknown");
        assert_eq!(strategy.should_retry(&error, 1), RetryDecision::DoNotRetry);
    }
}
