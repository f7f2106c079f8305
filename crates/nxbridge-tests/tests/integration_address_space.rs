// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Address Space Integration Tests
//!
//! The engine driving the in-memory address space, with OPC UA clients
//! played through [`ClientSession`]s.

use std::sync::Arc;

use tokio::sync::mpsc;

use nxbridge_core::{
    expose_tags, ChangeNotification, ChangeOutcome, ControllerGateway, DataType, EngineConfig,
    ExposedNodes, NodePublisher, PublisherError, SyncEngine, TagRegistry, Value,
};
use nxbridge_opcua::{ClientIdentity, ClientSession, CredentialChecker, InMemoryAddressSpace};
use nxbridge_tests::prelude::*;

struct Bridge {
    space: Arc<InMemoryAddressSpace>,
    controller: MockController,
    engine: Arc<SyncEngine>,
    nodes: ExposedNodes,
    notifications: mpsc::UnboundedReceiver<ChangeNotification>,
}

impl Bridge {
    async fn start(credentials: CredentialChecker) -> Self {
        let space = Arc::new(InMemoryAddressSpace::new(credentials));
        let tags = TagFixtures::standard_set();
        let controller = MockController::seeded(tags.iter());

        let mut registry = TagRegistry::new(tags).unwrap();
        let nodes = expose_tags(&mut registry, space.as_ref(), &layout()).unwrap();
        let gateway = ControllerGateway::new(Box::new(controller.session()), TEST_CONTROLLER_IP);
        let engine = Arc::new(SyncEngine::new(
            Arc::new(registry),
            space.clone(),
            gateway,
            nodes.health.clone(),
            EngineConfig::default(),
        ));
        let notifications = engine.subscribe_all().unwrap();
        space.start().await.unwrap();

        Self {
            space,
            controller,
            engine,
            nodes,
            notifications,
        }
    }

    fn client(&self) -> ClientSession<'_> {
        self.space.open_session(ClientIdentity::Anonymous).unwrap()
    }

    fn node(&self, name: &str) -> nxbridge_core::NodeHandle {
        self.engine.registry().node_of(name).cloned().unwrap()
    }

    async fn pump(&mut self) -> Vec<ChangeOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            outcomes.push(self.engine.handle_change(notification).await);
        }
        outcomes
    }
}

// =============================================================================
// Layout
// =============================================================================

#[tokio::test]
async fn test_layout_under_one_object() {
    let bridge = Bridge::start(CredentialChecker::disabled()).await;

    assert_eq!(bridge.space.namespace_index("urn:nxbridge:test"), Some(2));
    let (label, children) = bridge.space.object(&bridge.nodes.object).unwrap();
    assert_eq!(label, "PLC");
    assert_eq!(children.len(), 5);
    assert_eq!(children.last(), Some(&bridge.nodes.health));

    let health = bridge.space.variable(&bridge.nodes.health).unwrap();
    assert_eq!(health.data_type, DataType::Bool);
    assert!(!health.writable);
    assert_eq!(health.value.value, Value::Bool(false));

    let speed = bridge.space.variable(&bridge.node("Speed")).unwrap();
    assert!(speed.writable);
    assert_eq!(speed.value.value, Value::Int32(10));
}

// =============================================================================
// Client Writes
// =============================================================================

#[tokio::test]
async fn test_client_write_reaches_controller() {
    let mut bridge = Bridge::start(CredentialChecker::disabled()).await;
    bridge.engine.connect_initial().await.unwrap();
    bridge.engine.poll_once().await;

    bridge.client().write(&bridge.node("Speed"), 15i32).unwrap();
    let outcomes = bridge.pump().await;

    assert!(matches!(outcomes.as_slice(), [ChangeOutcome::Written]));
    assert_eq!(bridge.controller.value("Speed"), Some(Value::Int32(15)));
}

#[tokio::test]
async fn test_poll_update_echo_is_suppressed() {
    let mut bridge = Bridge::start(CredentialChecker::disabled()).await;
    bridge.engine.connect_initial().await.unwrap();
    bridge.engine.poll_once().await;
    assert!(bridge.pump().await.is_empty());

    bridge.controller.set_value("Speed", 20i32);
    bridge.engine.poll_once().await;

    let outcomes = bridge.pump().await;
    assert!(matches!(outcomes.as_slice(), [ChangeOutcome::Echo]));
    assert!(bridge.controller.writes().is_empty());

    let read = bridge.client().read(&bridge.node("Speed")).unwrap();
    assert_eq!(read.value, Value::Int32(20));
    assert!(read.is_good());
}

#[tokio::test]
async fn test_rejected_client_writes_never_notify() {
    let mut bridge = Bridge::start(CredentialChecker::disabled()).await;
    bridge.engine.connect_initial().await.unwrap();
    bridge.engine.poll_once().await;
    let client = bridge.client();

    let err = client.write(&bridge.node("Temperature"), 30.0f32).unwrap_err();
    assert!(matches!(err, PublisherError::NotWritable { .. }));

    let err = client.write(&bridge.node("Speed"), "abc").unwrap_err();
    assert!(matches!(err, PublisherError::TypeMismatch { .. }));

    let err = client.write(&bridge.nodes.health, true).unwrap_err();
    assert!(matches!(err, PublisherError::NotWritable { .. }));

    drop(client);
    assert!(bridge.pump().await.is_empty());
    assert!(bridge.controller.writes().is_empty());
}

#[tokio::test]
async fn test_health_node_reports_unreachable_controller() {
    let bridge = Bridge::start(CredentialChecker::disabled()).await;
    bridge.controller.fail_connects(1, ScriptedFailure::Unreachable);

    bridge.engine.connect_initial().await.unwrap();
    let health = bridge.client().read(&bridge.nodes.health).unwrap();
    assert_eq!(health.value, Value::Bool(true));

    bridge.engine.recover().await.unwrap();
    let health = bridge.client().read(&bridge.nodes.health).unwrap();
    assert_eq!(health.value, Value::Bool(false));
}

// =============================================================================
// Sessions
// =============================================================================

#[tokio::test]
async fn test_authentication_is_enforced() {
    let bridge = Bridge::start(CredentialChecker::new("operator", "s3cret")).await;

    let err = bridge
        .space
        .open_session(ClientIdentity::Anonymous)
        .err()
        .unwrap();
    assert!(matches!(err, PublisherError::AccessDenied { .. }));
    assert!(bridge
        .space
        .open_session(ClientIdentity::user("operator", "wrong"))
        .is_err());

    let session = bridge
        .space
        .open_session(ClientIdentity::user("operator", "s3cret"))
        .unwrap();
    assert_eq!(session.identity(), &ClientIdentity::user("operator", "s3cret"));
    assert!(bridge.space.authenticate_credentials("operator", "s3cret"));
    assert!(!bridge.space.authenticate_credentials("admin", "s3cret"));
}

#[tokio::test]
async fn test_stopped_space_refuses_clients() {
    let bridge = Bridge::start(CredentialChecker::disabled()).await;
    bridge.space.stop().await.unwrap();

    assert!(bridge.space.open_session(ClientIdentity::Anonymous).is_err());
    // A second stop is a no-op.
    bridge.space.stop().await.unwrap();
}
