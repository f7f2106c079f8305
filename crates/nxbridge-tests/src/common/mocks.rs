// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! - [`MockController`]: a controller whose failures are scripted per call,
//!   recording every call its sessions make
//! - [`RecordingPublisher`]: an address space that records every publish and
//!   lets tests play OPC UA clients writing to nodes

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use nxbridge_core::{
    ChangeCallback, ChangeNotification, ControllerError, ControllerResult, ControllerSession,
    DataType, DataValue, NodeHandle, NodePublisher, PublisherError, PublisherResult,
    TagDescriptor, Value,
};

// =============================================================================
// Scripted Failures
// =============================================================================

/// A failure a [`MockController`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// The controller cannot be reached.
    Unreachable,
    /// The established link was reset.
    LinkReset,
    /// The controller refused the session.
    SessionRejected,
    /// The controller rejected the tag.
    TagRejected,
}

impl ScriptedFailure {
    fn error(self, tag: &str) -> ControllerError {
        match self {
            Self::Unreachable => ControllerError::from_io(io::Error::from(io::ErrorKind::TimedOut)),
            Self::LinkReset => {
                ControllerError::from_io(io::Error::from(io::ErrorKind::ConnectionReset))
            }
            Self::SessionRejected => ControllerError::protocol("register session refused"),
            Self::TagRejected => ControllerError::tag(tag, "path destination unknown"),
        }
    }
}

/// A call made by a [`MockSession`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `connect(ip)`.
    Connect(String),
    /// `register_session()`.
    RegisterSession,
    /// `close_session()`.
    CloseSession,
    /// `read_tag(name)`.
    Read(String),
    /// `write_tag(name, value)`.
    Write(String, Value),
}

// =============================================================================
// Mock Controller
// =============================================================================

#[derive(Debug)]
struct MockState {
    values: HashMap<String, Value>,
    link_up: bool,
    session_open: bool,
    connect_failures: VecDeque<ScriptedFailure>,
    register_failures: VecDeque<ScriptedFailure>,
    read_failures: HashMap<String, VecDeque<ScriptedFailure>>,
    write_failures: HashMap<String, VecDeque<ScriptedFailure>>,
    calls: Vec<MockCall>,
}

/// Shared handle to a scriptable controller.
#[derive(Debug, Clone)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Creates a controller with no tags and the link up.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                values: HashMap::new(),
                link_up: true,
                session_open: false,
                connect_failures: VecDeque::new(),
                register_failures: VecDeque::new(),
                read_failures: HashMap::new(),
                write_failures: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Creates a controller holding each tag's initial value.
    pub fn seeded<'a>(tags: impl IntoIterator<Item = &'a TagDescriptor>) -> Self {
        let controller = Self::new();
        for tag in tags {
            controller.set_value(tag.name(), tag.initial_value().clone());
        }
        controller
    }

    /// Creates a session to this controller.
    pub fn session(&self) -> MockSession {
        MockSession {
            controller: self.clone(),
        }
    }

    /// Sets a tag value, as if changed by the controller program.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) {
        self.state.lock().values.insert(name.to_string(), value.into());
    }

    /// Returns a tag value.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.state.lock().values.get(name).cloned()
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_connects(&self, count: usize, failure: ScriptedFailure) {
        let mut state = self.state.lock();
        state.connect_failures.extend(std::iter::repeat(failure).take(count));
    }

    /// Makes the next session registration fail.
    pub fn fail_next_register(&self, failure: ScriptedFailure) {
        self.state.lock().register_failures.push_back(failure);
    }

    /// Makes the next read of `tag` fail.
    pub fn fail_next_read(&self, tag: &str, failure: ScriptedFailure) {
        self.state
            .lock()
            .read_failures
            .entry(tag.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Makes the next write to `tag` fail.
    pub fn fail_next_write(&self, tag: &str, failure: ScriptedFailure) {
        self.state
            .lock()
            .write_failures
            .entry(tag.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Cuts the link. The open session is lost.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.link_up = false;
        state.session_open = false;
    }

    /// Restores the link.
    pub fn restore_link(&self) {
        self.state.lock().link_up = true;
    }

    /// Returns `true` while a session is registered.
    pub fn is_session_open(&self) -> bool {
        self.state.lock().session_open
    }

    /// Returns every call made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Returns every successful write, in order.
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(name, value) => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of connect attempts.
    pub fn connect_attempts(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Connect(_)))
    }

    /// Returns the number of reads attempted.
    pub fn read_count(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Read(_)))
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

/// Session to a [`MockController`].
#[derive(Debug)]
pub struct MockSession {
    controller: MockController,
}

impl MockSession {
    fn check_link(state: &MockState) -> ControllerResult<()> {
        if !state.link_up {
            return Err(ScriptedFailure::LinkReset.error(""));
        }
        if !state.session_open {
            return Err(ControllerError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerSession for MockSession {
    async fn connect(&mut self, ip_address: &str) -> ControllerResult<()> {
        let mut state = self.controller.state.lock();
        state.calls.push(MockCall::Connect(ip_address.to_string()));
        if let Some(failure) = state.connect_failures.pop_front() {
            return Err(failure.error(""));
        }
        if !state.link_up {
            return Err(ScriptedFailure::Unreachable.error(""));
        }
        Ok(())
    }

    async fn register_session(&mut self) -> ControllerResult<()> {
        let mut state = self.controller.state.lock();
        state.calls.push(MockCall::RegisterSession);
        if let Some(failure) = state.register_failures.pop_front() {
            return Err(failure.error(""));
        }
        state.session_open = true;
        Ok(())
    }

    async fn close_session(&mut self) -> ControllerResult<()> {
        let mut state = self.controller.state.lock();
        state.calls.push(MockCall::CloseSession);
        state.session_open = false;
        Ok(())
    }

    async fn read_tag(&mut self, name: &str) -> ControllerResult<Value> {
        let mut state = self.controller.state.lock();
        state.calls.push(MockCall::Read(name.to_string()));
        Self::check_link(&state)?;
        if let Some(failure) = state.read_failures.get_mut(name).and_then(VecDeque::pop_front) {
            return Err(failure.error(name));
        }
        state
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptedFailure::TagRejected.error(name))
    }

    async fn write_tag(&mut self, name: &str, value: &Value) -> ControllerResult<()> {
        let mut state = self.controller.state.lock();
        Self::check_link(&state)?;
        if let Some(failure) = state.write_failures.get_mut(name).and_then(VecDeque::pop_front) {
            return Err(failure.error(name));
        }
        state.values.insert(name.to_string(), value.clone());
        state.calls.push(MockCall::Write(name.to_string(), value.clone()));
        Ok(())
    }

    fn display_name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Recording Publisher
// =============================================================================

#[derive(Default)]
struct PublisherState {
    namespaces: Vec<String>,
    values: HashMap<NodeHandle, Value>,
    writable: HashSet<NodeHandle>,
    published: Vec<(NodeHandle, Value)>,
    callbacks: HashMap<NodeHandle, Vec<ChangeCallback>>,
    running: bool,
}

/// An address space that records what the bridge does to it.
///
/// With [`with_echo`](Self::with_echo), a publish that changes a node's
/// value is delivered to its subscribers like any other data change, the
/// way an OPC UA subscription reports the bridge's own updates.
#[derive(Default)]
pub struct RecordingPublisher {
    state: Mutex<PublisherState>,
    echo: bool,
}

impl RecordingPublisher {
    /// Creates a publisher that does not echo publishes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a publisher that echoes value changes to subscribers.
    pub fn with_echo() -> Self {
        Self {
            echo: true,
            ..Self::default()
        }
    }

    /// Returns the node a variable named `name` was created as.
    pub fn node(&self, name: &str) -> Option<NodeHandle> {
        self.state
            .lock()
            .values
            .keys()
            .find(|node| node.identifier == name)
            .cloned()
    }

    /// Returns the current value of a variable.
    pub fn value(&self, name: &str) -> Option<Value> {
        let node = self.node(name)?;
        self.state.lock().values.get(&node).cloned()
    }

    /// Returns every value published to a variable, in order.
    pub fn published_to(&self, name: &str) -> Vec<Value> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|(node, _)| node.identifier == name)
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// Returns the total number of publishes.
    pub fn publish_count(&self) -> usize {
        self.state.lock().published.len()
    }

    /// Returns `true` if clients may write the variable.
    pub fn is_writable(&self, name: &str) -> bool {
        self.node(name)
            .map_or(false, |node| self.state.lock().writable.contains(&node))
    }

    /// Returns `true` if at least one callback is registered for the variable.
    pub fn is_subscribed(&self, name: &str) -> bool {
        self.node(name).map_or(false, |node| {
            self.state
                .lock()
                .callbacks
                .get(&node)
                .map_or(false, |callbacks| !callbacks.is_empty())
        })
    }

    /// Returns `true` between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Plays an OPC UA client writing `value` to a variable.
    ///
    /// Read-only variables reject the write; otherwise the value is stored
    /// and subscribers are notified with a data value envelope.
    pub fn client_write(&self, name: &str, value: impl Into<Value>) -> PublisherResult<()> {
        let node = self.node(name).ok_or_else(|| PublisherError::unknown_node(name))?;
        let value = value.into();
        let callbacks = {
            let mut state = self.state.lock();
            if !state.writable.contains(&node) {
                return Err(PublisherError::not_writable(&node));
            }
            state.values.insert(node.clone(), value.clone());
            state.callbacks.get(&node).cloned().unwrap_or_default()
        };
        for callback in callbacks {
            callback(ChangeNotification::envelope(node.clone(), DataValue::good(value.clone())));
        }
        Ok(())
    }

    /// Delivers a notification for an arbitrary node to every subscriber.
    pub fn notify_raw(&self, node: NodeHandle, value: impl Into<Value>) {
        let value = value.into();
        let callbacks: Vec<ChangeCallback> =
            self.state.lock().callbacks.values().flatten().cloned().collect();
        for callback in callbacks {
            callback(ChangeNotification::raw(node.clone(), value.clone()));
        }
    }
}

#[async_trait]
impl NodePublisher for RecordingPublisher {
    fn register_namespace(&self, uri: &str) -> PublisherResult<u16> {
        let mut state = self.state.lock();
        let position = match state.namespaces.iter().position(|ns| ns == uri) {
            Some(position) => position,
            None => {
                state.namespaces.push(uri.to_string());
                state.namespaces.len() - 1
            }
        };
        Ok(2 + position as u16)
    }

    fn create_object(&self, namespace_index: u16, label: &str) -> PublisherResult<NodeHandle> {
        Ok(NodeHandle::new(namespace_index, label))
    }

    fn create_variable(
        &self,
        namespace_index: u16,
        _parent: &NodeHandle,
        name: &str,
        initial: &Value,
        _data_type: DataType,
    ) -> PublisherResult<NodeHandle> {
        let node = NodeHandle::new(namespace_index, name);
        let mut state = self.state.lock();
        if state.values.contains_key(&node) {
            return Err(PublisherError::node_creation(name, "node already exists"));
        }
        state.values.insert(node.clone(), initial.clone());
        Ok(node)
    }

    fn set_writable(&self, node: &NodeHandle, writable: bool) -> PublisherResult<()> {
        let mut state = self.state.lock();
        if !state.values.contains_key(node) {
            return Err(PublisherError::unknown_node(node));
        }
        if writable {
            state.writable.insert(node.clone());
        } else {
            state.writable.remove(node);
        }
        Ok(())
    }

    fn set_value(&self, node: &NodeHandle, value: &Value) -> PublisherResult<()> {
        let callbacks = {
            let mut state = self.state.lock();
            let slot = state
                .values
                .get_mut(node)
                .ok_or_else(|| PublisherError::unknown_node(node))?;
            let changed = !slot.same_as(value);
            *slot = value.clone();
            state.published.push((node.clone(), value.clone()));
            if self.echo && changed {
                state.callbacks.get(node).cloned().unwrap_or_default()
            } else {
                Vec::new()
            }
        };
        for callback in callbacks {
            callback(ChangeNotification::envelope(node.clone(), DataValue::good(value.clone())));
        }
        Ok(())
    }

    fn subscribe(&self, node: &NodeHandle, callback: ChangeCallback) -> PublisherResult<()> {
        let mut state = self.state.lock();
        if !state.values.contains_key(node) {
            return Err(PublisherError::unknown_node(node));
        }
        state.callbacks.entry(node.clone()).or_default().push(callback);
        Ok(())
    }

    fn authenticate_credentials(&self, _username: &str, _password: &str) -> bool {
        true
    }

    async fn start(&self) -> PublisherResult<()> {
        self.state.lock().running = true;
        Ok(())
    }

    async fn stop(&self) -> PublisherResult<()> {
        self.state.lock().running = false;
        Ok(())
    }

    fn describe(&self) -> String {
        "recording publisher".to_string()
    }
}
