// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory simulated controller.
//!
//! [`SimulatedController`] holds a tag table and link state behind a shared
//! handle; [`SimulatedSession`] is the [`ControllerSession`] talking to it.
//! Text values are stored the way a controller stores them, as
//! length-prefixed byte strings, so reads go through the same formatting as
//! a real transport.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use crate::controller::ControllerSession;
use crate::error::{ControllerError, ControllerResult};
use crate::registry::TagDescriptor;
use crate::types::Value;

/// Number of recent writes a [`SimulatedController`] remembers.
pub const WRITE_HISTORY_LIMIT: usize = 256;

#[derive(Debug)]
struct ControllerState {
    tags: HashMap<String, Value>,
    link_up: bool,
    reject_registration: bool,
    session_open: bool,
    writes: VecDeque<(String, Value)>,
    write_count: usize,
    sessions_registered: u64,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            tags: HashMap::new(),
            link_up: true,
            reject_registration: false,
            session_open: false,
            writes: VecDeque::new(),
            write_count: 0,
            sessions_registered: 0,
        }
    }
}

/// Shared handle to a simulated controller.
#[derive(Debug, Clone, Default)]
pub struct SimulatedController {
    state: Arc<Mutex<ControllerState>>,
}

impl SimulatedController {
    /// Creates an empty controller with the link up.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a controller holding the initial value of each tag.
    pub fn seeded<'a>(tags: impl IntoIterator<Item = &'a TagDescriptor>) -> Self {
        let controller = Self::new();
        {
            let mut state = controller.state.lock();
            for tag in tags {
                state
                    .tags
                    .insert(tag.name().to_string(), encode(tag.initial_value()));
            }
        }
        controller
    }

    /// Creates a new session to this controller.
    pub fn session(&self) -> SimulatedSession {
        SimulatedSession {
            controller: self.clone(),
            transport_open: false,
        }
    }

    /// Sets a tag's raw value, as if changed by the controller program.
    pub fn set_value(&self, name: &str, value: impl Into<Value>) {
        self.state.lock().tags.insert(name.to_string(), value.into());
    }

    /// Returns a tag's raw value.
    pub fn value(&self, name: &str) -> Option<Value> {
        self.state.lock().tags.get(name).cloned()
    }

    /// Simulates a network failure. Open sessions are lost.
    pub fn drop_link(&self) {
        let mut state = self.state.lock();
        state.link_up = false;
        state.session_open = false;
    }

    /// Restores the network.
    pub fn restore_link(&self) {
        self.state.lock().link_up = true;
    }

    /// Makes session registration fail with a protocol error.
    pub fn reject_registration(&self, reject: bool) {
        self.state.lock().reject_registration = reject;
    }

    /// Returns `true` if a session is registered.
    pub fn is_session_open(&self) -> bool {
        self.state.lock().session_open
    }

    /// Returns the most recent writes received, oldest first.
    ///
    /// At most [`WRITE_HISTORY_LIMIT`] writes are kept.
    pub fn writes(&self) -> Vec<(String, Value)> {
        self.state.lock().writes.iter().cloned().collect()
    }

    /// Returns the number of writes received.
    pub fn write_count(&self) -> usize {
        self.state.lock().write_count
    }

    /// Returns the number of sessions registered so far.
    pub fn sessions_registered(&self) -> u64 {
        self.state.lock().sessions_registered
    }
}

/// Encodes text as a length-prefixed controller string.
fn encode(value: &Value) -> Value {
    match value {
        Value::String(text) => {
            let bytes = text.as_bytes();
            let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
            let mut raw = Vec::with_capacity(2 + len as usize);
            raw.extend_from_slice(&len.to_le_bytes());
            raw.extend_from_slice(&bytes[..len as usize]);
            Value::Bytes(raw)
        }
        other => other.clone(),
    }
}

fn link_error(kind: io::ErrorKind) -> ControllerError {
    ControllerError::from_io(io::Error::from(kind))
}

/// Session to a [`SimulatedController`].
#[derive(Debug)]
pub struct SimulatedSession {
    controller: SimulatedController,
    transport_open: bool,
}

impl SimulatedSession {
    fn check_session(&self) -> ControllerResult<()> {
        let state = self.controller.state.lock();
        if !state.link_up {
            return Err(link_error(io::ErrorKind::ConnectionReset));
        }
        if !self.transport_open || !state.session_open {
            return Err(ControllerError::NotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerSession for SimulatedSession {
    async fn connect(&mut self, ip_address: &str) -> ControllerResult<()> {
        if !self.controller.state.lock().link_up {
            return Err(link_error(io::ErrorKind::ConnectionRefused));
        }
        trace!(ip = %ip_address, "Simulated transport opened");
        self.transport_open = true;
        Ok(())
    }

    async fn register_session(&mut self) -> ControllerResult<()> {
        let mut state = self.controller.state.lock();
        if !state.link_up {
            return Err(link_error(io::ErrorKind::ConnectionReset));
        }
        if !self.transport_open {
            return Err(ControllerError::protocol("register session without transport"));
        }
        if state.reject_registration {
            return Err(ControllerError::protocol("session registration rejected"));
        }
        state.session_open = true;
        state.sessions_registered += 1;
        Ok(())
    }

    async fn close_session(&mut self) -> ControllerResult<()> {
        self.transport_open = false;
        self.controller.state.lock().session_open = false;
        Ok(())
    }

    async fn read_tag(&mut self, name: &str) -> ControllerResult<Value> {
        self.check_session()?;
        self.controller
            .state
            .lock()
            .tags
            .get(name)
            .cloned()
            .ok_or_else(|| ControllerError::tag(name, "path destination unknown"))
    }

    async fn write_tag(&mut self, name: &str, value: &Value) -> ControllerResult<()> {
        self.check_session()?;
        let mut state = self.controller.state.lock();
        if !state.tags.contains_key(name) {
            return Err(ControllerError::tag(name, "path destination unknown"));
        }
        state.tags.insert(name.to_string(), encode(value));
        if state.writes.len() == WRITE_HISTORY_LIMIT {
            state.writes.pop_front();
        }
        state.writes.push_back((name.to_string(), value.clone()));
        state.write_count += 1;
        Ok(())
    }

    fn display_name(&self) -> &str {
        "simulated"
    }
}

// =============================================================================
// Tests
// =============================================================================
