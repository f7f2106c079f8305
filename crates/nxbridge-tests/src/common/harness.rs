// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! A bridge wired to a [`MockController`] and a [`RecordingPublisher`].

use std::sync::Arc;

use tokio::sync::mpsc;

use nxbridge_core::{
    expose_tags, ChangeNotification, ChangeOutcome, ControllerGateway, ControllerResult,
    EngineConfig, ExposedNodes, NodeHandle, SyncEngine, TagDescriptor, TagRegistry, Value,
};

use super::fixtures::layout;
use super::mocks::{MockController, RecordingPublisher};

/// Controller address the harness connects to.
pub const TEST_CONTROLLER_IP: &str = "192.168.250.1";

/// An engine over scripted boundaries.
///
/// Notifications are not consumed by a background task; tests drain them
/// with [`pump`](Self::pump) to observe each outcome.
pub struct BridgeHarness {
    /// The controller behind the gateway.
    pub controller: MockController,
    /// The address space.
    pub publisher: Arc<RecordingPublisher>,
    /// The engine under test.
    pub engine: Arc<SyncEngine>,
    /// Nodes created at bootstrap.
    pub nodes: ExposedNodes,
    notifications: mpsc::UnboundedReceiver<ChangeNotification>,
}

impl BridgeHarness {
    /// Builds a harness with default timing and a non-echoing publisher.
    pub fn new(tags: Vec<TagDescriptor>) -> Self {
        Self::build(tags, RecordingPublisher::new(), EngineConfig::default())
    }

    /// Builds a harness whose publisher echoes value changes to subscribers.
    pub fn with_echo(tags: Vec<TagDescriptor>) -> Self {
        Self::build(tags, RecordingPublisher::with_echo(), EngineConfig::default())
    }

    /// Builds a harness with explicit engine timing.
    pub fn with_config(tags: Vec<TagDescriptor>, config: EngineConfig) -> Self {
        Self::build(tags, RecordingPublisher::new(), config)
    }

    fn build(tags: Vec<TagDescriptor>, publisher: RecordingPublisher, config: EngineConfig) -> Self {
        let controller = MockController::seeded(tags.iter());
        let mut registry = TagRegistry::new(tags).expect("valid tag set");
        let publisher = Arc::new(publisher);
        let nodes = expose_tags(&mut registry, publisher.as_ref(), &layout()).expect("bootstrap");

        let gateway = ControllerGateway::new(Box::new(controller.session()), TEST_CONTROLLER_IP);
        let engine = Arc::new(SyncEngine::new(
            Arc::new(registry),
            publisher.clone(),
            gateway,
            nodes.health.clone(),
            config,
        ));
        let notifications = engine.subscribe_all().expect("subscribe");

        Self {
            controller,
            publisher,
            engine,
            nodes,
            notifications,
        }
    }

    /// Opens the controller session.
    pub async fn connect(&self) -> ControllerResult<()> {
        self.engine.connect_initial().await
    }

    /// Opens the session and runs the first poll cycle.
    pub async fn start(&self) {
        self.connect().await.expect("initial connect");
        self.engine.poll_once().await;
        assert!(self.engine.is_ready(), "first poll should complete");
    }

    /// Returns the node bound to a tag.
    pub fn node(&self, name: &str) -> NodeHandle {
        self.engine
            .registry()
            .node_of(name)
            .cloned()
            .unwrap_or_else(|| panic!("no node bound to '{}'", name))
    }

    /// Handles every queued notification, in order.
    pub async fn pump(&mut self) -> Vec<ChangeOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            outcomes.push(self.engine.handle_change(notification).await);
        }
        outcomes
    }

    /// Takes the notification receiver, e.g. to hand it to the notifier loop.
    ///
    /// [`pump`](Self::pump) sees nothing afterwards.
    pub fn take_notifications(&mut self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        let (_, closed) = mpsc::unbounded_channel();
        std::mem::replace(&mut self.notifications, closed)
    }

    /// Returns the values published to the health node, in order.
    pub fn health_history(&self) -> Vec<Value> {
        self.publisher.published_to(&self.nodes.health.identifier)
    }
}
