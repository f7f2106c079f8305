// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA address space.
//!
//! [`InMemoryAddressSpace`] implements [`NodePublisher`] without a network
//! listener. Clients are represented by [`ClientSession`]s opened through
//! [`InMemoryAddressSpace::open_session`], which apply the same rules a
//! server applies on the wire: credentials are checked at activation and
//! writes are checked against the node's access level and data type.
//!
//! Subscribers are notified on every value change, whether it came from a
//! client or from [`NodePublisher::set_value`]. Callbacks run on the caller's
//! thread after the address space lock is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, trace};

use nxbridge_core::{
    ChangeCallback, ChangeNotification, DataType, DataValue, NodeHandle, NodePublisher,
    PublisherError, PublisherResult, Value,
};

use crate::auth::{ClientIdentity, CredentialChecker};

/// Namespace 0, always present.
pub const OPC_UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// Namespace 1, the server's own namespace.
pub const SERVER_NAMESPACE: &str = "urn:nxbridge:server";

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone)]
struct ObjectNode {
    label: String,
    children: Vec<NodeHandle>,
}

#[derive(Debug, Clone)]
struct VariableNode {
    parent: NodeHandle,
    data_type: DataType,
    writable: bool,
    value: DataValue,
}

/// A read-only view of a variable node.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSnapshot {
    /// Node identifier.
    pub node: NodeHandle,
    /// Owning object.
    pub parent: NodeHandle,
    /// Declared data type.
    pub data_type: DataType,
    /// Whether clients may write.
    pub writable: bool,
    /// Current value.
    pub value: DataValue,
}

#[derive(Default)]
struct SpaceState {
    namespaces: Vec<String>,
    objects: HashMap<NodeHandle, ObjectNode>,
    variables: HashMap<NodeHandle, VariableNode>,
    subscribers: HashMap<NodeHandle, Vec<ChangeCallback>>,
}

// =============================================================================
// InMemoryAddressSpace
// =============================================================================

/// Address space held in process memory.
pub struct InMemoryAddressSpace {
    state: RwLock<SpaceState>,
    credentials: CredentialChecker,
    running: AtomicBool,
}

impl InMemoryAddressSpace {
    /// Creates an empty address space.
    pub fn new(credentials: CredentialChecker) -> Self {
        let state = SpaceState {
            namespaces: vec![OPC_UA_NAMESPACE.to_string(), SERVER_NAMESPACE.to_string()],
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
            credentials,
            running: AtomicBool::new(false),
        }
    }

    /// Returns `true` while serving clients.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Looks up a namespace index by URI.
    pub fn namespace_index(&self, uri: &str) -> Option<u16> {
        let state = self.state.read();
        state
            .namespaces
            .iter()
            .position(|ns| ns == uri)
            .and_then(|i| u16::try_from(i).ok())
    }

    /// Returns an object's label and child variables in creation order.
    pub fn object(&self, node: &NodeHandle) -> Option<(String, Vec<NodeHandle>)> {
        let state = self.state.read();
        state
            .objects
            .get(node)
            .map(|o| (o.label.clone(), o.children.clone()))
    }

    /// Returns a snapshot of a variable node.
    pub fn variable(&self, node: &NodeHandle) -> Option<VariableSnapshot> {
        let state = self.state.read();
        state.variables.get(node).map(|v| VariableSnapshot {
            node: node.clone(),
            parent: v.parent.clone(),
            data_type: v.data_type,
            writable: v.writable,
            value: v.value.clone(),
        })
    }

    /// Returns the current value of a variable node.
    pub fn value(&self, node: &NodeHandle) -> Option<Value> {
        self.state.read().variables.get(node).map(|v| v.value.value.clone())
    }

    /// Returns the number of variable nodes.
    pub fn variable_count(&self) -> usize {
        self.state.read().variables.len()
    }

    /// Activates a client session.
    ///
    /// Fails with [`PublisherError::AccessDenied`] if the identity is not
    /// accepted, and with [`PublisherError::Server`] if the address space is
    /// not serving.
    pub fn open_session(&self, identity: ClientIdentity) -> PublisherResult<ClientSession<'_>> {
        if !self.is_running() {
            return Err(PublisherError::server("server is not running"));
        }
        if !self.credentials.authenticate(&identity) {
            let reason = match identity {
                ClientIdentity::Anonymous => "anonymous access is disabled".to_string(),
                ClientIdentity::UserName { username, .. } => {
                    format!("invalid credentials for '{}'", username)
                }
            };
            return Err(PublisherError::AccessDenied { reason });
        }
        Ok(ClientSession {
            space: self,
            identity,
        })
    }

    /// Stores a value and notifies subscribers if it changed.
    fn store(&self, node: &NodeHandle, value: &Value, from_client: bool) -> PublisherResult<()> {
        let (callbacks, data_value) = {
            let mut state = self.state.write();
            let variable = state
                .variables
                .get_mut(node)
                .ok_or_else(|| PublisherError::unknown_node(node))?;

            if from_client && !variable.writable {
                return Err(PublisherError::not_writable(node));
            }
            let canonical = variable
                .data_type
                .coerce(value)
                .ok_or_else(|| PublisherError::type_mismatch(node, variable.data_type, value))?;

            let changed = !canonical.same_as(&variable.value.value);
            variable.value = DataValue::good(canonical);
            if !changed {
                return Ok(());
            }

            let data_value = variable.value.clone();
            let callbacks = state.subscribers.get(node).cloned().unwrap_or_default();
            (callbacks, data_value)
        };

        trace!(node = %node, value = %data_value.value, subscribers = callbacks.len(), "Value changed");
        for callback in callbacks {
            callback(ChangeNotification::envelope(node.clone(), data_value.clone()));
        }
        Ok(())
    }
}

impl Default for InMemoryAddressSpace {
    fn default() -> Self {
        Self::new(CredentialChecker::disabled())
    }
}

#[async_trait]
impl NodePublisher for InMemoryAddressSpace {
    fn register_namespace(&self, uri: &str) -> PublisherResult<u16> {
        if uri.trim().is_empty() {
            return Err(PublisherError::Namespace {
                uri: uri.to_string(),
                message: "URI cannot be empty".to_string(),
            });
        }

        let mut state = self.state.write();
        if let Some(i) = state.namespaces.iter().position(|ns| ns == uri) {
            return u16::try_from(i).map_err(|_| PublisherError::server("namespace table overflow"));
        }
        let index = u16::try_from(state.namespaces.len()).map_err(|_| PublisherError::Namespace {
            uri: uri.to_string(),
            message: "namespace table is full".to_string(),
        })?;
        state.namespaces.push(uri.to_string());
        debug!(uri = %uri, index, "Namespace registered");
        Ok(index)
    }

    fn create_object(&self, namespace_index: u16, label: &str) -> PublisherResult<NodeHandle> {
        let mut state = self.state.write();
        if usize::from(namespace_index) >= state.namespaces.len() {
            return Err(PublisherError::node_creation(
                label,
                format!("namespace {} is not registered", namespace_index),
            ));
        }

        let node = NodeHandle::new(namespace_index, label);
        if state.objects.contains_key(&node) || state.variables.contains_key(&node) {
            return Err(PublisherError::node_creation(label, "node already exists"));
        }
        state.objects.insert(
            node.clone(),
            ObjectNode {
                label: label.to_string(),
                children: Vec::new(),
            },
        );
        Ok(node)
    }

    fn create_variable(
        &self,
        namespace_index: u16,
        parent: &NodeHandle,
        name: &str,
        initial: &Value,
        data_type: DataType,
    ) -> PublisherResult<NodeHandle> {
        let node = NodeHandle::new(namespace_index, name);
        let value = data_type
            .coerce(initial)
            .ok_or_else(|| PublisherError::type_mismatch(&node, data_type, initial))?;

        let mut state = self.state.write();
        if state.objects.contains_key(&node) || state.variables.contains_key(&node) {
            return Err(PublisherError::node_creation(name, "node already exists"));
        }
        let object = state
            .objects
            .get_mut(parent)
            .ok_or_else(|| PublisherError::node_creation(name, format!("no parent object {}", parent)))?;
        object.children.push(node.clone());

        state.variables.insert(
            node.clone(),
            VariableNode {
                parent: parent.clone(),
                data_type,
                writable: false,
                value: DataValue::good(value),
            },
        );
        Ok(node)
    }

    fn set_writable(&self, node: &NodeHandle, writable: bool) -> PublisherResult<()> {
        let mut state = self.state.write();
        let variable = state
            .variables
            .get_mut(node)
            .ok_or_else(|| PublisherError::unknown_node(node))?;
        variable.writable = writable;
        Ok(())
    }

    fn set_value(&self, node: &NodeHandle, value: &Value) -> PublisherResult<()> {
        self.store(node, value, false)
    }

    fn subscribe(&self, node: &NodeHandle, callback: ChangeCallback) -> PublisherResult<()> {
        let mut state = self.state.write();
        if !state.variables.contains_key(node) {
            return Err(PublisherError::unknown_node(node));
        }
        state.subscribers.entry(node.clone()).or_default().push(callback);
        Ok(())
    }

    fn authenticate_credentials(&self, username: &str, password: &str) -> bool {
        self.credentials.check(username, password)
    }

    async fn start(&self) -> PublisherResult<()> {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!(
                variables = self.variable_count(),
                authentication = self.credentials.is_enabled(),
                "In-memory address space serving"
            );
        }
        Ok(())
    }

    async fn stop(&self) -> PublisherResult<()> {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("In-memory address space stopped");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory address space".to_string()
    }
}

// =============================================================================
// ClientSession
// =============================================================================

/// An activated client session on an [`InMemoryAddressSpace`].
pub struct ClientSession<'a> {
    space: &'a InMemoryAddressSpace,
    identity: ClientIdentity,
}

impl ClientSession<'_> {
    /// Returns the identity the session was activated with.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Reads a variable.
    pub fn read(&self, node: &NodeHandle) -> PublisherResult<DataValue> {
        self.space
            .variable(node)
            .map(|v| v.value)
            .ok_or_else(|| PublisherError::unknown_node(node))
    }

    /// Writes a variable.
    ///
    /// The node must be writable and the value representable as its type.
    pub fn write(&self, node: &NodeHandle, value: impl Into<Value>) -> PublisherResult<()> {
        if !self.space.is_running() {
            return Err(PublisherError::server("server is not running"));
        }
        self.space.store(node, &value.into(), true)
    }
}

// =============================================================================
// Tests
// =============================================================================
