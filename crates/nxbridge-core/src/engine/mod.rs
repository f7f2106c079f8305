// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bidirectional synchronization engine.
//!
//! The [`SyncEngine`] is the explicit context shared by the two concurrent
//! activities of the bridge:
//!
//! - the **poll loop** ([`SyncEngine::run_poll_loop`]) reads every tag on a
//!   fixed interval and republishes values that changed
//! - the **change notifier** ([`SyncEngine::run_change_notifier`]) forwards
//!   client writes on exposed nodes to the controller
//!
//! Connectivity failures hand control to the reconnect supervisor
//! ([`SyncEngine::recover`]), which re-establishes the session with a fixed
//! backoff and drives the health node.
//!
//! # Locking
//!
//! The last-known-value cache and the controller gateway live behind one
//! async mutex. A poll cycle (reading and publishing) and the handling of one
//! notification each run entirely under it, so controller calls are never
//! issued in parallel and echo detection always sees the cache a publish
//! produced. Publisher callbacks never take the lock; they only enqueue.
//!
//! Every queued notification is stamped with the number of poll publishes
//! made so far. A client write that was queued before the poll loop
//! refreshed the same tag is still forwarded, but it does not replace the
//! polled value in the cache, so the echo of that publish stays an echo.
//!
//! # Example
//!
//! ```rust,ignore
//! let nodes = expose_tags(&mut registry, publisher.as_ref(), &layout)?;
//! let engine = Arc::new(SyncEngine::new(
//!     Arc::new(registry),
//!     publisher,
//!     gateway,
//!     nodes.health,
//!     EngineConfig::default(),
//! ));
//!
//! engine.connect_initial().await?;
//! let notifications = engine.subscribe_all()?;
//! tokio::spawn(engine.clone().run_poll_loop(shutdown.subscribe()));
//! tokio::spawn(engine.clone().run_change_notifier(notifications, shutdown.subscribe()));
//! ```

mod bootstrap;
mod notifier;
mod poll;
mod reconnect;

pub use bootstrap::{expose_tags, AddressSpaceLayout, ExposedNodes, DEFAULT_HEALTH_TAG};
pub use notifier::ChangeOutcome;
pub use poll::CycleOutcome;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::controller::{ConnectionState, ControllerGateway};
use crate::publisher::{NodeHandle, NodePublisher};
use crate::registry::TagRegistry;
use crate::retry::FixedDelay;
use crate::types::Value;

// =============================================================================
// EngineConfig
// =============================================================================

/// Engine timing configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between poll cycles.
    pub poll_interval: Duration,

    /// Reconnect backoff policy.
    pub reconnect: FixedDelay,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            reconnect: FixedDelay::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the reconnect backoff.
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect = FixedDelay::indefinite(backoff);
        self
    }
}

// =============================================================================
// EngineStats
// =============================================================================

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    cycles_completed: AtomicU64,
    cycles_aborted: AtomicU64,
    cycles_skipped: AtomicU64,
    values_published: AtomicU64,
    read_failures: AtomicU64,
    writes_forwarded: AtomicU64,
    writes_failed: AtomicU64,
    echoes_suppressed: AtomicU64,
    notifications_ignored: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnects: AtomicU64,
}

impl EngineStats {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            values_published: self.values_published.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            writes_forwarded: self.writes_forwarded.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            echoes_suppressed: self.echoes_suppressed.load(Ordering::Relaxed),
            notifications_ignored: self.notifications_ignored.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`EngineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EngineStatsSnapshot {
    /// Poll cycles that read every tag.
    pub cycles_completed: u64,
    /// Poll cycles cut short by a lost link.
    pub cycles_aborted: u64,
    /// Ticks skipped while not connected.
    pub cycles_skipped: u64,
    /// Node values published by the poll loop.
    pub values_published: u64,
    /// Tag reads that failed and were skipped.
    pub read_failures: u64,
    /// Client writes forwarded to the controller.
    pub writes_forwarded: u64,
    /// Client writes rejected or failed.
    pub writes_failed: u64,
    /// Notifications discarded as echoes.
    pub echoes_suppressed: u64,
    /// Notifications ignored before ready or for unknown nodes.
    pub notifications_ignored: u64,
    /// Session re-establishment attempts.
    pub reconnect_attempts: u64,
    /// Successful re-establishments.
    pub reconnects: u64,
}

// =============================================================================
// SyncEngine
// =============================================================================

/// A last known value.
#[derive(Debug)]
struct CachedValue {
    value: Value,
    /// Poll publish count when the poll loop last set this tag; 0 if never.
    polled_at: u64,
}

struct EngineState {
    gateway: ControllerGateway,
    cache: HashMap<String, CachedValue>,
}

/// The synchronization engine context.
pub struct SyncEngine {
    registry: Arc<TagRegistry>,
    publisher: Arc<dyn NodePublisher>,
    health_node: NodeHandle,
    state: Mutex<EngineState>,
    ready: AtomicBool,
    health_raised: AtomicBool,
    poll_publishes: Arc<AtomicU64>,
    config: EngineConfig,
    stats: EngineStats,
}

impl SyncEngine {
    /// Creates an engine.
    ///
    /// Every tag in `registry` should already be bound to its node (see
    /// [`expose_tags`]); unbound tags are neither polled nor subscribed.
    pub fn new(
        registry: Arc<TagRegistry>,
        publisher: Arc<dyn NodePublisher>,
        gateway: ControllerGateway,
        health_node: NodeHandle,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            publisher,
            health_node,
            state: Mutex::new(EngineState {
                gateway,
                cache: HashMap::new(),
            }),
            ready: AtomicBool::new(false),
            health_raised: AtomicBool::new(false),
            poll_publishes: Arc::new(AtomicU64::new(0)),
            config,
            stats: EngineStats::default(),
        }
    }

    /// Returns `true` once the first poll cycle has completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Returns the tag registry.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the engine counters.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the health node.
    pub fn health_node(&self) -> &NodeHandle {
        &self.health_node
    }

    /// Returns the gateway's connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.lock().await.gateway.state()
    }

    /// Returns the last known value of a tag.
    pub async fn cached_value(&self, name: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .cache
            .get(name)
            .map(|cached| cached.value.clone())
    }

    /// Closes the controller session.
    ///
    /// Called once both loops have stopped. Failures are logged.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        match state.gateway.close_session().await {
            Ok(()) => tracing::info!("Controller session closed"),
            Err(e) => tracing::warn!(error = %e, "Failed to close controller session"),
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("tags", &self.registry.len())
            .field("health_node", &self.health_node)
            .field("ready", &self.is_ready())
            .field("config", &self.config)
            .finish()
    }
}

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::error::{PublisherError, PublisherResult};
    use crate::publisher::{ChangeCallback, ChangeNotification, NodeHandle, NodePublisher};
    use crate::types::{DataType, Value};

    /// Publisher that records every published value.
    #[derive(Default)]
    pub(crate) struct TestPublisher {
        pub values: Mutex<HashMap<NodeHandle, Value>>,
        pub published: Mutex<Vec<(NodeHandle, Value)>>,
        pub callbacks: Mutex<HashMap<NodeHandle, ChangeCallback>>,
    }

    impl TestPublisher {
        pub fn published_to(&self, identifier: &str) -> Vec<Value> {
            self.published
                .lock()
                .iter()
                .filter(|(node, _)| node.identifier == identifier)
                .map(|(_, value)| value.clone())
                .collect()
        }

        pub fn client_write(&self, node: &NodeHandle, value: Value) {
            let callback = self.callbacks.lock().get(node).cloned();
            if let Some(callback) = callback {
                callback(ChangeNotification::raw(node.clone(), value));
            }
        }
    }

    #[async_trait]
    impl NodePublisher for TestPublisher {
        fn register_namespace(&self, _uri: &str) -> PublisherResult<u16> {
            Ok(2)
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
            self.values.lock().insert(node.clone(), initial.clone());
            Ok(node)
        }

        fn set_writable(&self, _node: &NodeHandle, _writable: bool) -> PublisherResult<()> {
            Ok(())
        }

        fn set_value(&self, node: &NodeHandle, value: &Value) -> PublisherResult<()> {
            let mut values = self.values.lock();
            let slot = values
                .get_mut(node)
                .ok_or_else(|| PublisherError::unknown_node(node))?;
            *slot = value.clone();
            self.published.lock().push((node.clone(), value.clone()));
            Ok(())
        }

        fn subscribe(&self, node: &NodeHandle, callback: ChangeCallback) -> PublisherResult<()> {
            self.callbacks.lock().insert(node.clone(), callback);
            Ok(())
        }

        fn authenticate_credentials(&self, _username: &str, _password: &str) -> bool {
            true
        }

        async fn start(&self) -> PublisherResult<()> {
            Ok(())
        }

        async fn stop(&self) -> PublisherResult<()> {
            Ok(())
        }
    }
}
