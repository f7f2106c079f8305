// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node publisher abstraction.
//!
//! The [`NodePublisher`] trait is the boundary between the synchronization
//! engine and the OPC UA server runtime. Implementations own the address
//! space; the engine only holds [`NodeHandle`]s.
//!
//! # Change delivery
//!
//! [`NodePublisher::subscribe`] registers a [`ChangeCallback`] that is invoked
//! on the publisher's own task whenever a subscribed node's value changes,
//! including changes made through [`NodePublisher::set_value`]. Callbacks must
//! not block and must not call back into the publisher; the engine's callbacks
//! only enqueue the notification.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PublisherResult;
use crate::types::{DataType, Value};

// =============================================================================
// NodeHandle
// =============================================================================

/// Identifier of a node in the publisher's address space.
///
/// Displays in the usual OPC UA string form, `ns=2;s=Speed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    /// Namespace index.
    pub namespace_index: u16,
    /// String identifier within the namespace.
    pub identifier: String,
}

impl NodeHandle {
    /// Creates a new handle.
    pub fn new(namespace_index: u16, identifier: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ns={};s={}", self.namespace_index, self.identifier)
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// Status code for a good value.
pub const STATUS_GOOD: u32 = 0;

/// A value together with its quality and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct DataValue {
    /// The carried value.
    pub value: Value,

    /// OPC UA status code.
    pub status_code: u32,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good value stamped with the current time.
    pub fn good(value: Value) -> Self {
        let now = Utc::now();
        Self {
            value,
            status_code: STATUS_GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }

    /// Returns `true` if the status is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status_code == STATUS_GOOD
    }
}

// =============================================================================
// ChangeNotification
// =============================================================================

/// Payload of a change notification.
///
/// Depending on the server runtime a notification carries either the bare
/// value or a full [`DataValue`] envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationPayload {
    /// The bare value.
    Raw(Value),
    /// A value with status and timestamps.
    Envelope(DataValue),
}

impl NotificationPayload {
    /// Unwraps the carried value.
    pub fn into_value(self) -> Value {
        match self {
            Self::Raw(value) => value,
            Self::Envelope(data_value) => data_value.value,
        }
    }

    /// Returns a reference to the carried value.
    pub fn value(&self) -> &Value {
        match self {
            Self::Raw(value) => value,
            Self::Envelope(data_value) => &data_value.value,
        }
    }
}

/// A value change on a subscribed node.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    /// The node whose value changed.
    pub node: NodeHandle,
    /// The new value.
    pub payload: NotificationPayload,
    /// Number of poll publishes the engine had made when this was queued.
    ///
    /// Set by the engine's subscription; `None` for notifications handed to
    /// the engine directly.
    pub(crate) queued_after: Option<u64>,
}

impl ChangeNotification {
    /// Creates a notification carrying a bare value.
    pub fn raw(node: NodeHandle, value: Value) -> Self {
        Self {
            node,
            payload: NotificationPayload::Raw(value),
            queued_after: None,
        }
    }

    /// Creates a notification carrying a data value envelope.
    pub fn envelope(node: NodeHandle, data_value: DataValue) -> Self {
        Self {
            node,
            payload: NotificationPayload::Envelope(data_value),
            queued_after: None,
        }
    }
}

/// Callback invoked for every change on a subscribed node.
pub type ChangeCallback = Arc<dyn Fn(ChangeNotification) + Send + Sync>;

// =============================================================================
// NodePublisher
// =============================================================================

/// OPC UA address space operations used by the bridge.
#[async_trait]
pub trait NodePublisher: Send + Sync {
    /// Registers a namespace and returns its index.
    fn register_namespace(&self, uri: &str) -> PublisherResult<u16>;

    /// Creates an object node under the objects folder.
    fn create_object(&self, namespace_index: u16, label: &str) -> PublisherResult<NodeHandle>;

    /// Creates a variable node under `parent` with an initial value.
    ///
    /// The node identifier is `name` and the node is read-only until
    /// [`set_writable`](Self::set_writable) is called.
    fn create_variable(
        &self,
        namespace_index: u16,
        parent: &NodeHandle,
        name: &str,
        initial: &Value,
        data_type: DataType,
    ) -> PublisherResult<NodeHandle>;

    /// Grants or revokes client write access.
    fn set_writable(&self, node: &NodeHandle, writable: bool) -> PublisherResult<()>;

    /// Sets the value of a variable node.
    fn set_value(&self, node: &NodeHandle, value: &Value) -> PublisherResult<()>;

    /// Registers a change callback for a node.
    fn subscribe(&self, node: &NodeHandle, callback: ChangeCallback) -> PublisherResult<()>;

    /// Checks a username/password pair.
    fn authenticate_credentials(&self, username: &str, password: &str) -> bool;

    /// Starts serving clients.
    async fn start(&self) -> PublisherResult<()>;

    /// Stops serving clients. Calling this on a stopped publisher is a no-op.
    async fn stop(&self) -> PublisherResult<()>;

    /// Returns a short description of the publisher for logging.
    fn describe(&self) -> String {
        "node publisher".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_handle_display() {
        assert_eq!(NodeHandle::new(2, "Speed").to_string(), "ns=2;s=Speed");
    }

    #[test]
    fn test_payload_unwrap() {
        let raw = NotificationPayload::Raw(Value::Int32(5));
        assert_eq!(raw.value(), &Value::Int32(5));
        assert_eq!(raw.into_value(), Value::Int32(5));

        let envelope = NotificationPayload::Envelope(DataValue::good(Value::Bool(true)));
        assert_eq!(envelope.value(), &Value::Bool(true));
        assert_eq!(envelope.into_value(), Value::Bool(true));
    }

    #[test]
    fn test_data_value_good() {
        let data_value = DataValue::good(Value::Int32(1));
        assert!(data_value.is_good());
        assert!(data_value.source_timestamp.is_some());
    }
}
