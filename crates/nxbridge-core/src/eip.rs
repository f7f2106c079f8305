// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! EtherNet/IP controller session.
//!
//! [`EipSession`] reaches the controller with explicit messaging over
//! EtherNet/IP and the symbolic Read Tag / Write Tag services, using the
//! [`rseip`] client. Reads return the controller's native representation:
//! the value is decoded from the CIP type code the controller reports, and
//! the gateway coerces it to the declared type. Anything without a scalar
//! type code, such as a controller string, is returned as raw bytes.
//!
//! Transport failures are classified with [`ControllerError::from_io`];
//! every other client failure is scoped to the stage it happened in.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rseip::client::ab_eip::*;
use rseip::precludes::*;
use rseip::ClientError;
use tokio::time::timeout;
use tracing::debug;

use crate::controller::ControllerSession;
use crate::error::{ControllerError, ControllerResult};
use crate::types::Value;

/// Default timeout for opening the transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a single tag service.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Error Classification
// =============================================================================

/// What the session was doing when the client failed.
#[derive(Debug, Clone, Copy)]
enum Stage<'a> {
    Connect,
    Close,
    Tag(&'a str),
}

fn classify(stage: Stage<'_>, error: ClientError) -> ControllerError {
    match error {
        ClientError::Io { err, .. } => ControllerError::from_io(err),
        other => match stage {
            Stage::Connect => ControllerError::protocol(format!("session rejected: {}", other)),
            Stage::Close => ControllerError::connectivity(format!("close failed: {}", other)),
            Stage::Tag(name) => ControllerError::tag(name, other.to_string()),
        },
    }
}

fn timed_out() -> ControllerError {
    ControllerError::from_io(io::Error::from(io::ErrorKind::TimedOut))
}

fn tag_path(name: &str) -> ControllerResult<EPath> {
    EPath::parse_tag(name)
        .map_err(|e| ControllerError::tag(name, format!("invalid tag path: {:?}", e)))
}

/// Decodes a tag reply by the type code the controller reported.
fn native_value(tag_type: TagType, raw: &[u8]) -> Value {
    fn le<const N: usize>(raw: &[u8]) -> Option<[u8; N]> {
        raw.get(..N)?.try_into().ok()
    }

    let decoded = match tag_type {
        TagType::Bool => raw.first().map(|&b| Value::Bool(b != 0)),
        TagType::Sint => le::<1>(raw).map(|b| Value::Int8(i8::from_le_bytes(b))),
        TagType::Int => le::<2>(raw).map(|b| Value::Int16(i16::from_le_bytes(b))),
        TagType::Dint => le::<4>(raw).map(|b| Value::Int32(i32::from_le_bytes(b))),
        TagType::Lint => le::<8>(raw).map(|b| Value::Int64(i64::from_le_bytes(b))),
        TagType::Real => le::<4>(raw).map(|b| Value::Float32(f32::from_le_bytes(b))),
        TagType::Lreal => le::<8>(raw).map(|b| Value::Float64(f64::from_le_bytes(b))),
        _ => None,
    };
    decoded.unwrap_or_else(|| Value::Bytes(raw.to_vec()))
}

// =============================================================================
// EipSession
// =============================================================================

/// Explicit-messaging session to a controller.
pub struct EipSession {
    client: Option<AbEipClient>,
    connect_timeout: Duration,
    operation_timeout: Duration,
}

impl EipSession {
    /// Creates a session with default timeouts. Nothing is opened yet.
    pub fn new() -> Self {
        Self {
            client: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Sets the timeout for opening the transport.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets the timeout for each tag service.
    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// Returns `true` if the transport is open.
    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn client(&mut self) -> ControllerResult<&mut AbEipClient> {
        self.client.as_mut().ok_or(ControllerError::NotConnected)
    }
}

impl Default for EipSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EipSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EipSession")
            .field("open", &self.is_open())
            .field("connect_timeout", &self.connect_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}

#[async_trait]
impl ControllerSession for EipSession {
    async fn connect(&mut self, ip_address: &str) -> ControllerResult<()> {
        self.client = None;
        let client = timeout(self.connect_timeout, AbEipClient::new_host_lookup(ip_address))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| classify(Stage::Connect, e))?;
        debug!(ip = %ip_address, "EtherNet/IP transport open");
        self.client = Some(client);
        Ok(())
    }

    /// The client registers its session while opening the transport, so
    /// this only checks that the transport is open.
    async fn register_session(&mut self) -> ControllerResult<()> {
        if self.client.is_none() {
            return Err(ControllerError::protocol("transport is not open"));
        }
        Ok(())
    }

    async fn close_session(&mut self) -> ControllerResult<()> {
        match self.client.take() {
            Some(mut client) => client.close().await.map_err(|e| classify(Stage::Close, e)),
            None => Ok(()),
        }
    }

    async fn read_tag(&mut self, name: &str) -> ControllerResult<Value> {
        let path = tag_path(name)?;
        let operation_timeout = self.operation_timeout;
        let client = self.client()?;

        let reply: TagValue<Bytes> = timeout(operation_timeout, client.read_tag(path))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| classify(Stage::Tag(name), e))?;
        Ok(native_value(reply.tag_type, &reply.value))
    }

    async fn write_tag(&mut self, name: &str, value: &Value) -> ControllerResult<()> {
        let path = tag_path(name)?;
        let operation_timeout = self.operation_timeout;

        // TODO: encode controller STRING writes once the client exposes the
        // string type code.
        let write = match value {
            Value::Bool(v) => Write::Bool(*v),
            Value::Int32(v) => Write::Dint(*v),
            Value::Float32(v) => Write::Real(*v),
            other => {
                return Err(ControllerError::tag(
                    name,
                    format!("{} values cannot be written over EtherNet/IP", other.type_name()),
                ))
            }
        };

        let client = self.client()?;
        let result = match write {
            Write::Bool(value) => {
                let tag = TagValue {
                    tag_type: TagType::Bool,
                    value,
                };
                timeout(operation_timeout, client.write_tag(path, tag)).await
            }
            Write::Dint(value) => {
                let tag = TagValue {
                    tag_type: TagType::Dint,
                    value,
                };
                timeout(operation_timeout, client.write_tag(path, tag)).await
            }
            Write::Real(value) => {
                let tag = TagValue {
                    tag_type: TagType::Real,
                    value,
                };
                timeout(operation_timeout, client.write_tag(path, tag)).await
            }
        };
        result
            .map_err(|_| timed_out())?
            .map_err(|e| classify(Stage::Tag(name), e))
    }

    fn display_name(&self) -> &str {
        "ethernet/ip"
    }
}

/// A value in a form the Write Tag service accepts.
enum Write {
    Bool(bool),
    Dint(i32),
    Real(f32),
}

// =============================================================================
// Tests
// =============================================================================
