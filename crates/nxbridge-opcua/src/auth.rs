// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client authentication.
//!
//! A single username/password pair is accepted. When authentication is
//! enabled, anonymous clients are rejected; when it is disabled, every
//! client is admitted.

use std::fmt;

use tracing::{debug, warn};

// =============================================================================
// ClientIdentity
// =============================================================================

/// The identity a client presents when activating a session.
#[derive(Clone, PartialEq, Eq)]
pub enum ClientIdentity {
    /// No credentials.
    Anonymous,
    /// Username and password.
    UserName {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

impl ClientIdentity {
    /// Creates a username/password identity.
    pub fn user(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserName {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::UserName { username, .. } => write!(f, "UserName({})", username),
        }
    }
}

// =============================================================================
// CredentialChecker
// =============================================================================

/// Checks client credentials against the configured pair.
#[derive(Clone, Default)]
pub struct CredentialChecker {
    credentials: Option<(String, String)>,
}

impl CredentialChecker {
    /// Admits every client.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Accepts only the given username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((username.into(), password.into())),
        }
    }

    /// Returns `true` if credentials are required.
    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    /// Returns the accepted username, if any.
    pub fn username(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(u, _)| u.as_str())
    }

    #[cfg(feature = "opcua-server")]
    pub(crate) fn pair(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// Checks a username/password pair.
    ///
    /// Always `true` when authentication is disabled.
    pub fn check(&self, username: &str, password: &str) -> bool {
        match &self.credentials {
            None => true,
            Some((expected_user, expected_pass)) => {
                // Both comparisons always run.
                let user_ok = constant_time_eq(username.as_bytes(), expected_user.as_bytes());
                let pass_ok = constant_time_eq(password.as_bytes(), expected_pass.as_bytes());
                user_ok & pass_ok
            }
        }
    }

    /// Decides whether a client may open a session.
    pub fn authenticate(&self, identity: &ClientIdentity) -> bool {
        let accepted = match identity {
            ClientIdentity::Anonymous => !self.is_enabled(),
            ClientIdentity::UserName { username, password } => self.check(username, password),
        };
        if accepted {
            debug!(identity = ?identity, "Client authenticated");
        } else {
            warn!(identity = ?identity, "Client authentication rejected");
        }
        accepted
    }
}

impl fmt::Debug for CredentialChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialChecker")
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_admits_everyone() {
        let checker = CredentialChecker::disabled();
        assert!(!checker.is_enabled());
        assert!(checker.authenticate(&ClientIdentity::Anonymous));
        assert!(checker.check("anyone", "anything"));
    }

    #[test]
    fn test_enabled_checks_pair() {
        let checker = CredentialChecker::new("operator", "s3cret");
        assert!(checker.authenticate(&ClientIdentity::user("operator", "s3cret")));
        assert!(!checker.authenticate(&ClientIdentity::user("operator", "wrong")));
        assert!(!checker.authenticate(&ClientIdentity::user("admin", "s3cret")));
        assert!(!checker.authenticate(&ClientIdentity::user("operator", "s3cret!")));
        assert!(!checker.authenticate(&ClientIdentity::Anonymous));
    }

    #[test]
    fn test_debug_hides_password() {
        let checker = CredentialChecker::new("operator", "s3cret");
        assert!(!format!("{:?}", checker).contains("s3cret"));
        assert!(!format!("{:?}", ClientIdentity::user("operator", "s3cret")).contains("s3cret"));
    }
}
