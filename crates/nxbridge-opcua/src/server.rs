// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA server backed by the `opcua` crate.
//!
//! The server runs on its own thread with its own runtime. Client writes are
//! detected by sampling subscribed variables every publishing interval; a
//! sample that differs from the previous one is delivered to the node's
//! callbacks as a [`ChangeNotification`] envelope.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use opcua::server::prelude::*;
use opcua::sync::RwLock as OpcUaRwLock;

use nxbridge_core::{
    ChangeCallback, ChangeNotification, DataType, DataValue as BridgeDataValue, NodeHandle,
    NodePublisher, PublisherError, PublisherResult, Value,
};

use crate::settings::{self, EndpointSecurity, ServerSettings};

const USER_TOKEN_ID: &str = "bridge-user";

type Subscribers = Arc<Mutex<HashMap<NodeHandle, Vec<ChangeCallback>>>>;

// =============================================================================
// OpcUaServer
// =============================================================================

/// OPC UA server publishing the bridge's address space.
pub struct OpcUaServer {
    settings: ServerSettings,
    server: Arc<OpcUaRwLock<Server>>,
    address_space: Arc<OpcUaRwLock<AddressSpace>>,
    subscribers: Subscribers,
    running: Mutex<Option<Running>>,
}

struct Running {
    thread: JoinHandle<()>,
    stop_sampler: watch::Sender<bool>,
}

impl OpcUaServer {
    /// Builds the server. Nothing is bound until [`NodePublisher::start`].
    pub fn new(settings: ServerSettings) -> PublisherResult<Self> {
        let server = build_server(&settings)?;
        let address_space = server.address_space();
        Ok(Self {
            settings,
            server: Arc::new(OpcUaRwLock::new(server)),
            address_space,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            running: Mutex::new(None),
        })
    }

    fn with_variable<T>(
        &self,
        node: &NodeHandle,
        f: impl FnOnce(&mut Variable) -> T,
    ) -> PublisherResult<T> {
        let node_id = to_node_id(node);
        let mut space = self.address_space.write();
        match space.find_node_mut(&node_id) {
            Some(NodeType::Variable(variable)) => Ok(f(variable)),
            _ => Err(PublisherError::unknown_node(node)),
        }
    }
}

fn build_server(settings: &ServerSettings) -> PublisherResult<Server> {
    let user_token_ids = match settings.credentials.pair() {
        Some(_) => vec![USER_TOKEN_ID.to_string()],
        None => vec![ANONYMOUS_USER_TOKEN_ID.to_string()],
    };

    let mut builder = ServerBuilder::new()
        .application_name(settings.application_name.as_str())
        .application_uri(settings.application_uri.as_str())
        .product_uri(settings.application_uri.as_str())
        .pki_dir(settings.pki_dir.clone())
        .host_and_port(settings.host.as_str(), settings.port)
        .discovery_urls(vec![settings.endpoint_url()]);

    if let Some((username, password)) = settings.credentials.pair() {
        builder = builder.user_token(USER_TOKEN_ID, ServerUserToken::user_pass(username, password));
    }

    builder = match &settings.security {
        EndpointSecurity::None => builder
            .create_sample_keypair(true)
            .endpoint("none", ServerEndpoint::new_none(settings.path.as_str(), &user_token_ids)),
        EndpointSecurity::Secured {
            policy,
            mode,
            certificate_path,
            private_key_path,
        } => builder
            .create_sample_keypair(false)
            .certificate_path(certificate_path.clone())
            .private_key_path(private_key_path.clone())
            .endpoint(
                "secured",
                ServerEndpoint::new(
                    settings.path.as_str(),
                    to_security_policy(*policy),
                    to_security_mode(*mode),
                    &user_token_ids,
                ),
            ),
    };

    builder
        .server()
        .ok_or_else(|| PublisherError::server("invalid OPC UA server configuration"))
}

#[async_trait]
impl NodePublisher for OpcUaServer {
    fn register_namespace(&self, uri: &str) -> PublisherResult<u16> {
        self.address_space
            .write()
            .register_namespace(uri)
            .map_err(|_| PublisherError::Namespace {
                uri: uri.to_string(),
                message: "rejected by address space".to_string(),
            })
    }

    fn create_object(&self, namespace_index: u16, label: &str) -> PublisherResult<NodeHandle> {
        let node = NodeHandle::new(namespace_index, label);
        let node_id = to_node_id(&node);
        let mut space = self.address_space.write();
        let inserted = ObjectBuilder::new(&node_id, label, label)
            .organized_by(ObjectId::ObjectsFolder)
            .insert(&mut space);
        if !inserted {
            return Err(PublisherError::node_creation(label, "node already exists"));
        }
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

        let node_id = to_node_id(&node);
        let mut space = self.address_space.write();
        let inserted = VariableBuilder::new(&node_id, name, name)
            .data_type(to_data_type_id(data_type))
            .value(to_variant(&value))
            .organized_by(to_node_id(parent))
            .insert(&mut space);
        if !inserted {
            return Err(PublisherError::node_creation(name, "node already exists"));
        }
        Ok(node)
    }

    fn set_writable(&self, node: &NodeHandle, writable: bool) -> PublisherResult<()> {
        self.with_variable(node, |variable| {
            variable.set_writable(writable);
            let user_level = if writable {
                UserAccessLevel::CURRENT_READ | UserAccessLevel::CURRENT_WRITE
            } else {
                UserAccessLevel::CURRENT_READ
            };
            variable.set_user_access_level(user_level);
        })
    }

    fn set_value(&self, node: &NodeHandle, value: &Value) -> PublisherResult<()> {
        let now = DateTime::now();
        let updated = self
            .address_space
            .write()
            .set_variable_value(to_node_id(node), to_variant(value), &now, &now);
        if updated {
            Ok(())
        } else {
            Err(PublisherError::unknown_node(node))
        }
    }

    fn subscribe(&self, node: &NodeHandle, callback: ChangeCallback) -> PublisherResult<()> {
        self.with_variable(node, |_| ())?;
        self.subscribers
            .lock()
            .entry(node.clone())
            .or_default()
            .push(callback);
        Ok(())
    }

    fn authenticate_credentials(&self, username: &str, password: &str) -> bool {
        self.settings.credentials.check(username, password)
    }

    async fn start(&self) -> PublisherResult<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let server = self.server.clone();
        let thread = std::thread::Builder::new()
            .name("opcua-server".to_string())
            .spawn(move || Server::run_server(server))
            .map_err(|e| PublisherError::server(format!("failed to spawn server thread: {}", e)))?;

        let (stop_sampler, stop_rx) = watch::channel(false);
        tokio::spawn(run_sampler(
            self.address_space.clone(),
            self.subscribers.clone(),
            self.settings.publishing_interval,
            stop_rx,
        ));

        info!(
            endpoint = %self.settings.endpoint_url(),
            security = %self.settings.security,
            authentication = self.settings.credentials.is_enabled(),
            "OPC UA server started"
        );
        *running = Some(Running {
            thread,
            stop_sampler,
        });
        Ok(())
    }

    async fn stop(&self) -> PublisherResult<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        let _ = running.stop_sampler.send(true);
        self.server.write().abort();

        let joined = tokio::task::spawn_blocking(move || running.thread.join()).await;
        match joined {
            Ok(Ok(())) => info!("OPC UA server stopped"),
            Ok(Err(_)) => error!("OPC UA server thread panicked"),
            Err(e) => warn!(error = %e, "Failed to join OPC UA server thread"),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("OPC UA server at {}", self.settings.endpoint_url())
    }
}

// =============================================================================
// Change Sampling
// =============================================================================

async fn run_sampler(
    address_space: Arc<OpcUaRwLock<AddressSpace>>,
    subscribers: Subscribers,
    interval: std::time::Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_seen: HashMap<NodeHandle, Value> = HashMap::new();

    debug!(interval_ms = interval.as_millis() as u64, "Change sampler started");
    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let watched: Vec<(NodeHandle, Vec<ChangeCallback>)> = subscribers
            .lock()
            .iter()
            .map(|(node, callbacks)| (node.clone(), callbacks.clone()))
            .collect();

        let samples: Vec<(NodeHandle, Vec<ChangeCallback>, Value)> = {
            let space = address_space.read();
            watched
                .into_iter()
                .filter_map(|(node, callbacks)| {
                    let value = read_variable(&space, &node)?;
                    Some((node, callbacks, value))
                })
                .collect()
        };

        for (node, callbacks, value) in samples {
            let changed = match last_seen.get(&node) {
                Some(previous) => !previous.same_as(&value),
                None => false,
            };
            last_seen.insert(node.clone(), value.clone());
            if !changed {
                continue;
            }
            let data_value = BridgeDataValue::good(value);
            for callback in &callbacks {
                callback(ChangeNotification::envelope(node.clone(), data_value.clone()));
            }
        }
    }
    debug!("Change sampler stopped");
}

fn read_variable(space: &AddressSpace, node: &NodeHandle) -> Option<Value> {
    match space.find_node(&to_node_id(node)) {
        Some(NodeType::Variable(variable)) => {
            let data_value = variable.value(
                TimestampsToReturn::Neither,
                NumericRange::None,
                &QualifiedName::null(),
                0.0,
            );
            data_value.value.as_ref().and_then(from_variant)
        }
        _ => None,
    }
}

// =============================================================================
// Conversions
// =============================================================================

fn to_node_id(node: &NodeHandle) -> NodeId {
    NodeId::new(node.namespace_index, node.identifier.clone())
}

fn to_data_type_id(data_type: DataType) -> DataTypeId {
    match data_type {
        DataType::Int32 => DataTypeId::Int32,
        DataType::Float => DataTypeId::Float,
        DataType::Bool => DataTypeId::Boolean,
        DataType::String => DataTypeId::String,
    }
}

fn to_security_policy(policy: settings::SecurityPolicy) -> SecurityPolicy {
    match policy {
        settings::SecurityPolicy::Basic128Rsa15 => SecurityPolicy::Basic128Rsa15,
        settings::SecurityPolicy::Basic256 => SecurityPolicy::Basic256,
        settings::SecurityPolicy::Basic256Sha256 => SecurityPolicy::Basic256Sha256,
        settings::SecurityPolicy::Aes128Sha256RsaOaep => SecurityPolicy::Aes128Sha256RsaOaep,
        settings::SecurityPolicy::Aes256Sha256RsaPss => SecurityPolicy::Aes256Sha256RsaPss,
    }
}

fn to_security_mode(mode: settings::SecurityMode) -> MessageSecurityMode {
    match mode {
        settings::SecurityMode::Sign => MessageSecurityMode::Sign,
        settings::SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
    }
}

fn to_variant(value: &Value) -> Variant {
    match value {
        Value::Bool(v) => Variant::Boolean(*v),
        Value::Int8(v) => Variant::SByte(*v),
        Value::Int16(v) => Variant::Int16(*v),
        Value::Int32(v) => Variant::Int32(*v),
        Value::Int64(v) => Variant::Int64(*v),
        Value::UInt8(v) => Variant::Byte(*v),
        Value::UInt16(v) => Variant::UInt16(*v),
        Value::UInt32(v) => Variant::UInt32(*v),
        Value::UInt64(v) => Variant::UInt64(*v),
        Value::Float32(v) => Variant::Float(*v),
        Value::Float64(v) => Variant::Double(*v),
        Value::String(v) => Variant::String(UAString::from(v.as_str())),
        Value::Bytes(v) => Variant::ByteString(ByteString::from(v.as_slice())),
        Value::Null => Variant::Empty,
    }
}

fn from_variant(variant: &Variant) -> Option<Value> {
    let value = match variant {
        Variant::Empty => Value::Null,
        Variant::Boolean(v) => Value::Bool(*v),
        Variant::SByte(v) => Value::Int8(*v),
        Variant::Byte(v) => Value::UInt8(*v),
        Variant::Int16(v) => Value::Int16(*v),
        Variant::UInt16(v) => Value::UInt16(*v),
        Variant::Int32(v) => Value::Int32(*v),
        Variant::UInt32(v) => Value::UInt32(*v),
        Variant::Int64(v) => Value::Int64(*v),
        Variant::UInt64(v) => Value::UInt64(*v),
        Variant::Float(v) => Value::Float32(*v),
        Variant::Double(v) => Value::Float64(*v),
        Variant::String(v) => Value::String(v.as_ref().to_string()),
        Variant::ByteString(v) => Value::Bytes(v.value.clone().unwrap_or_default()),
        _ => return None,
    };
    Some(value)
}
