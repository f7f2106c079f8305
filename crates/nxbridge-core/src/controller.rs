// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Controller session abstraction and gateway.
//!
//! A [`ControllerSession`] is the raw explicit-session transport to a
//! tag-addressed controller. The [`ControllerGateway`] wraps exactly one
//! session and adds what the synchronization engine relies on:
//!
//! - connection state tracking ([`ConnectionState`])
//! - gating: no tag operation reaches the session unless it is `Connected`
//! - value formatting ([`format_tag_value`]) and declared-type validation
//! - transition to `Reconnecting` on connectivity and protocol failures
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──▶ Connected ──connectivity error──▶ Reconnecting
//!                                 ▲                                  │
//!                                 └────────── reestablish() ─────────┘
//! ```

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::registry::TagDescriptor;
use crate::types::Value;

// =============================================================================
// ControllerSession Trait
// =============================================================================

/// Explicit-session transport to a controller.
///
/// Implementations only move values; they do not know about declared types.
/// Errors must be classified (see [`ControllerError::kind`]) so the gateway
/// can tell a lost link from a single bad tag.
#[async_trait]
pub trait ControllerSession: Send {
    /// Opens the transport to the controller at `ip_address`.
    async fn connect(&mut self, ip_address: &str) -> ControllerResult<()>;

    /// Registers an explicit session on an open transport.
    async fn register_session(&mut self) -> ControllerResult<()>;

    /// Closes the session and the transport.
    async fn close_session(&mut self) -> ControllerResult<()>;

    /// Reads a tag in the transport's native representation.
    async fn read_tag(&mut self, name: &str) -> ControllerResult<Value>;

    /// Writes a tag.
    async fn write_tag(&mut self, name: &str, value: &Value) -> ControllerResult<()>;

    /// Returns a short name for logging.
    fn display_name(&self) -> &str;
}

// =============================================================================
// ConnectionState
// =============================================================================

/// Connection state of the controller gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session has been established yet, or it was closed on shutdown.
    #[default]
    Disconnected,

    /// The session is established.
    Connected,

    /// The session was lost and is being re-established.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if the gateway is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the gateway is reconnecting.
    #[inline]
    pub fn is_reconnecting(&self) -> bool {
        matches!(self, Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// =============================================================================
// Value Formatting
// =============================================================================

/// Normalizes a raw controller value.
///
/// String-like values become plain text:
///
/// - `String` passes through
/// - `Bytes` holding a length-prefixed controller string (2-byte little-endian
///   length followed by at least that many bytes) yields the prefixed text
/// - any other `Bytes` value is decoded as a whole
///
/// Decoding is lossy UTF-8 and trailing NUL padding is stripped. All other
/// variants pass through unchanged.
///
/// # Examples
///
/// ```
/// use nxbridge_core::controller::format_tag_value;
/// use nxbridge_core::types::Value;
///
/// let raw = Value::Bytes(vec![3, 0, b'a', b'b', b'c', 0, 0]);
/// assert_eq!(format_tag_value(raw), Value::String("abc".into()));
/// assert_eq!(format_tag_value(Value::Int32(7)), Value::Int32(7));
/// ```
pub fn format_tag_value(raw: Value) -> Value {
    match raw {
        Value::Bytes(bytes) => {
            let text = match length_prefixed(&bytes) {
                Some(body) => body,
                None => bytes.as_slice(),
            };
            let end = text.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            Value::String(String::from_utf8_lossy(&text[..end]).into_owned())
        }
        other => other,
    }
}

/// Returns the body of a length-prefixed string.
///
/// The prefix is only trusted when the body holds no NUL and everything
/// after it is NUL padding; otherwise the buffer is a plain string.
fn length_prefixed(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() < 2 {
        return None;
    }
    let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    let rest = &bytes[2..];
    if len > rest.len() {
        return None;
    }
    let (body, padding) = rest.split_at(len);
    if body.contains(&0) || padding.iter().any(|&b| b != 0) {
        return None;
    }
    Some(body)
}

// =============================================================================
// ControllerGateway
// =============================================================================

/// Owner of the single controller session.
pub struct ControllerGateway {
    session: Box<dyn ControllerSession>,
    ip_address: String,
    state: ConnectionState,
}

impl ControllerGateway {
    /// Creates a gateway in the `Disconnected` state.
    pub fn new(session: Box<dyn ControllerSession>, ip_address: impl Into<String>) -> Self {
        Self {
            session,
            ip_address: ip_address.into(),
            state: ConnectionState::Disconnected,
        }
    }

    /// Returns the current connection state.
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns the controller address.
    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    /// Opens the transport and registers a session.
    ///
    /// On failure the state is left unchanged; the caller decides whether the
    /// error is fatal or a reason to reconnect.
    pub async fn connect(&mut self) -> ControllerResult<()> {
        self.open().await?;
        self.state = ConnectionState::Connected;
        info!(
            controller = %self.session.display_name(),
            ip = %self.ip_address,
            "Controller session established"
        );
        Ok(())
    }

    /// Re-establishes the session after a failure.
    ///
    /// The gateway stays `Reconnecting` until this succeeds.
    pub async fn reestablish(&mut self) -> ControllerResult<()> {
        self.state = ConnectionState::Reconnecting;
        self.open().await?;
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn open(&mut self) -> ControllerResult<()> {
        self.session.connect(&self.ip_address).await?;
        self.session.register_session().await
    }

    /// Moves the gateway to `Reconnecting`.
    ///
    /// Returns `true` if the state changed.
    pub fn mark_reconnecting(&mut self) -> bool {
        if self.state.is_reconnecting() {
            return false;
        }
        self.state = ConnectionState::Reconnecting;
        true
    }

    /// Closes the session.
    ///
    /// A connected gateway becomes `Disconnected`; a reconnecting one stays
    /// `Reconnecting`.
    pub async fn close_session(&mut self) -> ControllerResult<()> {
        if self.state.is_connected() {
            self.state = ConnectionState::Disconnected;
        }
        self.session.close_session().await
    }

    /// Reads a tag and converts it to the tag's declared type.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::NotConnected`] unless `Connected`
    /// - connectivity and protocol errors from the session, after which the
    ///   gateway is `Reconnecting`
    /// - [`ControllerError::Tag`] if the controller rejects the read or
    ///   returns a value not representable as the declared type
    pub async fn read_tag(&mut self, tag: &TagDescriptor) -> ControllerResult<Value> {
        self.ensure_connected()?;

        let raw = match self.session.read_tag(tag.name()).await {
            Ok(raw) => raw,
            Err(error) => return Err(self.observe(error)),
        };

        let formatted = format_tag_value(raw);
        tag.data_type().coerce(&formatted).ok_or_else(|| {
            ControllerError::tag(
                tag.name(),
                format!(
                    "controller returned {} value {}, declared {}",
                    formatted.type_name(),
                    formatted,
                    tag.data_type()
                ),
            )
        })
    }

    /// Writes a value to a tag.
    ///
    /// The value is validated against the tag before the session is touched.
    /// Returns the canonical value that was written.
    ///
    /// # Errors
    ///
    /// - [`ControllerError::Validation`] if the tag is not writable or the
    ///   value is not representable as its declared type
    /// - [`ControllerError::NotConnected`] unless `Connected`
    /// - connectivity, protocol and tag errors from the session
    pub async fn write_tag(&mut self, tag: &TagDescriptor, value: &Value) -> ControllerResult<Value> {
        if !tag.is_writable() {
            return Err(ControllerError::validation(tag.name(), "tag is not writable"));
        }
        let canonical = tag
            .data_type()
            .coerce(value)
            .ok_or_else(|| ControllerError::type_mismatch(tag.name(), tag.data_type(), value))?;

        self.ensure_connected()?;

        match self.session.write_tag(tag.name(), &canonical).await {
            Ok(()) => {
                debug!(tag = %tag.name(), value = %canonical, "Tag written");
                Ok(canonical)
            }
            Err(error) => Err(self.observe(error)),
        }
    }

    fn ensure_connected(&self) -> ControllerResult<()> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(ControllerError::NotConnected)
        }
    }

    fn observe(&mut self, error: ControllerError) -> ControllerError {
        if error.triggers_reconnect() && self.mark_reconnecting() {
            warn!(
                controller = %self.session.display_name(),
                error = %error,
                "Controller link lost"
            );
        }
        error
    }
}

impl fmt::Debug for ControllerGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerGateway")
            .field("session", &self.session.display_name())
            .field("ip_address", &self.ip_address)
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::simulated::SimulatedController;
    use crate::types::DataType;

    fn speed() -> TagDescriptor {
        TagDescriptor::new("Speed", DataType::Int32, true)
    }

    async fn connected(controller: &SimulatedController) -> ControllerGateway {
        let mut gateway = ControllerGateway::new(Box::new(controller.session()), "192.168.250.1");
        gateway.connect().await.unwrap();
        gateway
    }

    #[test]
    fn test_format_tag_value() {
        assert_eq!(
            format_tag_value(Value::Bytes(b"plain".to_vec())),
            Value::String("plain".into())
        );
        assert_eq!(
            format_tag_value(Value::Bytes(vec![2, 0, b'o', b'k'])),
            Value::String("ok".into())
        );
        assert_eq!(
            format_tag_value(Value::Bytes(vec![3, 0, b'a', b'b', b'c', 0, 0])),
            Value::String("abc".into())
        );
        assert_eq!(format_tag_value(Value::Bytes(vec![0, 0])), Value::String(String::new()));

        // NUL-padded plain strings keep their text.
        let mut padded = vec![b'A'];
        padded.resize(101, 0);
        assert_eq!(format_tag_value(Value::Bytes(padded)), Value::String("A".into()));
        let mut padded = b"OK".to_vec();
        padded.resize(82, 0);
        assert_eq!(format_tag_value(Value::Bytes(padded)), Value::String("OK".into()));

        // A prefix followed by more text is not a prefix.
        assert_eq!(
            format_tag_value(Value::Bytes(vec![1, 0, b'a', b'b'])),
            Value::String("\u{1}\u{0}ab".into())
        );
        assert_eq!(
            format_tag_value(Value::Bytes(vec![0xff, 0xfe])),
            Value::String("\u{fffd}\u{fffd}".into())
        );
        assert_eq!(format_tag_value(Value::from("x")), Value::from("x"));
        assert_eq!(format_tag_value(Value::Float32(1.5)), Value::Float32(1.5));
    }

    #[tokio::test]
    async fn test_read_requires_connection() {
        let controller = SimulatedController::new();
        let mut gateway = ControllerGateway::new(Box::new(controller.session()), "10.0.0.1");
        let err = gateway.read_tag(&speed()).await.unwrap_err();
        assert!(matches!(err, ControllerError::NotConnected));
    }

    #[tokio::test]
    async fn test_read_coerces_declared_type() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", Value::Int64(10));
        let mut gateway = connected(&controller).await;

        assert_eq!(gateway.read_tag(&speed()).await.unwrap(), Value::Int32(10));
    }

    #[tokio::test]
    async fn test_read_unrepresentable_is_tag_error() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", Value::Float64(1.5));
        let mut gateway = connected(&controller).await;

        let err = gateway.read_tag(&speed()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tag);
        assert!(gateway.state().is_connected());
    }

    #[tokio::test]
    async fn test_write_validation() {
        let controller = SimulatedController::new();
        let mut gateway = connected(&controller).await;

        let err = gateway
            .write_tag(&speed(), &Value::from("fast"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let read_only = TagDescriptor::new("Running", DataType::Bool, false);
        let err = gateway
            .write_tag(&read_only, &Value::Bool(true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(controller.write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_returns_canonical_value() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", Value::Int32(10));
        let mut gateway = connected(&controller).await;

        let written = gateway.write_tag(&speed(), &Value::Int64(15)).await.unwrap();
        assert_eq!(written, Value::Int32(15));
        assert_eq!(controller.value("Speed"), Some(Value::Int32(15)));
    }

    #[tokio::test]
    async fn test_link_loss_enters_reconnecting() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", Value::Int32(10));
        let mut gateway = connected(&controller).await;

        controller.drop_link();
        let err = gateway.read_tag(&speed()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(gateway.state().is_reconnecting());

        let err = gateway.read_tag(&speed()).await.unwrap_err();
        assert!(matches!(err, ControllerError::NotConnected));

        assert!(gateway.reestablish().await.is_err());
        assert!(gateway.state().is_reconnecting());

        controller.restore_link();
        gateway.reestablish().await.unwrap();
        assert!(gateway.state().is_connected());
        assert_eq!(gateway.read_tag(&speed()).await.unwrap(), Value::Int32(10));
    }

    #[tokio::test]
    async fn test_close_session() {
        let controller = SimulatedController::new();
        let mut gateway = connected(&controller).await;
        gateway.close_session().await.unwrap();
        assert_eq!(gateway.state(), ConnectionState::Disconnected);
        assert!(!controller.is_session_open());
    }
}
