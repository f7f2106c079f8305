// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnect supervisor and health node.

use std::sync::atomic::Ordering;

use tracing::{debug, error, info, warn};

use super::{EngineStats, SyncEngine};
use crate::error::{ControllerResult, ErrorKind};
use crate::retry::RetryDecision;
use crate::types::Value;

impl SyncEngine {
    /// Establishes the first controller session.
    ///
    /// A protocol failure is returned as fatal. A connectivity failure is
    /// logged, the gateway is marked `Reconnecting` and the health node set,
    /// leaving recovery to the poll loop.
    pub async fn connect_initial(&self) -> ControllerResult<()> {
        let mut state = self.state.lock().await;
        match state.gateway.connect().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::Protocol => {
                error!(error = %e, "Controller rejected the session");
                Err(e)
            }
            Err(e) => {
                warn!(
                    ip = %state.gateway.ip_address(),
                    error = %e,
                    "Controller unreachable at startup, will keep retrying"
                );
                state.gateway.mark_reconnecting();
                self.publish_health(true);
                Ok(())
            }
        }
    }

    /// Re-establishes the controller session.
    ///
    /// Publishes the unhealthy flag unless it is already raised, then
    /// repeatedly closes the stale session and opens a new one, sleeping the
    /// fixed backoff between attempts with the engine unlocked. Returns once
    /// connected, with the healthy flag published, or when the backoff policy
    /// gives up.
    pub async fn recover(&self) -> ControllerResult<()> {
        if !self.health_raised.load(Ordering::Acquire) {
            self.publish_health(true);
        }
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            EngineStats::incr(&self.stats.reconnect_attempts);

            let result = {
                let mut state = self.state.lock().await;
                if state.gateway.state().is_connected() {
                    self.publish_health(false);
                    return Ok(());
                }
                state.gateway.mark_reconnecting();
                if let Err(e) = state.gateway.close_session().await {
                    debug!(error = %e, "Closing stale session failed");
                }
                state.gateway.reestablish().await
            };

            match result {
                Ok(()) => {
                    EngineStats::incr(&self.stats.reconnects);
                    self.publish_health(false);
                    info!(attempts = attempt, "Controller session re-established");
                    return Ok(());
                }
                Err(e) => match self.config.reconnect.should_retry(&e, attempt) {
                    RetryDecision::Retry(delay) => {
                        warn!(
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "Reconnect failed"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry => return Err(e),
                },
            }
        }
    }

    /// Sets the health node; `true` means the controller link is down.
    pub(crate) fn publish_health(&self, failed: bool) {
        match self.publisher.set_value(&self.health_node, &Value::Bool(failed)) {
            Ok(()) => self.health_raised.store(failed, Ordering::Release),
            Err(e) => warn!(node = %self.health_node, error = %e, "Failed to publish health"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::controller::{ConnectionState, ControllerGateway};
    use crate::engine::testing::TestPublisher;
    use crate::engine::{expose_tags, AddressSpaceLayout, CycleOutcome, EngineConfig};
    use crate::registry::{TagDescriptor, TagRegistry};
    use crate::simulated::SimulatedController;
    use crate::types::DataType;

    fn engine(controller: &SimulatedController) -> (Arc<SyncEngine>, Arc<TestPublisher>) {
        let mut registry =
            TagRegistry::new([TagDescriptor::new("Speed", DataType::Int32, true)]).unwrap();
        let publisher = Arc::new(TestPublisher::default());
        let layout = AddressSpaceLayout {
            namespace_uri: "urn:test".into(),
            object_label: "PLC".into(),
            health_tag: "COM_PLC_FAIL".into(),
        };
        let nodes = expose_tags(&mut registry, publisher.as_ref(), &layout).unwrap();
        let gateway = ControllerGateway::new(Box::new(controller.session()), "10.0.0.1");
        let engine = SyncEngine::new(
            Arc::new(registry),
            publisher.clone(),
            gateway,
            nodes.health,
            EngineConfig::default().with_reconnect_backoff(Duration::from_secs(3)),
        );
        (Arc::new(engine), publisher)
    }

    #[tokio::test]
    async fn test_startup_protocol_error_is_fatal() {
        let controller = SimulatedController::new();
        controller.reject_registration(true);
        let (engine, _) = engine(&controller);

        let err = engine.connect_initial().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_startup_unreachable_marks_reconnecting() {
        let controller = SimulatedController::new();
        controller.drop_link();
        let (engine, publisher) = engine(&controller);

        engine.connect_initial().await.unwrap();
        assert_eq!(engine.connection_state().await, ConnectionState::Reconnecting);
        assert_eq!(publisher.published_to("COM_PLC_FAIL"), vec![Value::Bool(true)]);
    }

    #[tokio::test]
    async fn test_recover_after_unreachable_startup_raises_health_once() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", 1i32);
        controller.drop_link();
        let (engine, publisher) = engine(&controller);
        engine.connect_initial().await.unwrap();

        controller.restore_link();
        engine.recover().await.unwrap();
        assert_eq!(engine.connection_state().await, ConnectionState::Connected);
        assert_eq!(
            publisher.published_to("COM_PLC_FAIL"),
            vec![Value::Bool(true), Value::Bool(false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_after_backoff() {
        let controller = SimulatedController::new();
        controller.set_value("Speed", 1i32);
        let (engine, publisher) = engine(&controller);
        engine.connect_initial().await.unwrap();
        controller.drop_link();
        assert!(matches!(engine.poll_once().await, CycleOutcome::Aborted(_)));

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.recover().await }
        });

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(engine.connection_state().await, ConnectionState::Reconnecting);
        controller.restore_link();

        task.await.unwrap().unwrap();
        assert_eq!(engine.connection_state().await, ConnectionState::Connected);
        assert_eq!(
            publisher.published_to("COM_PLC_FAIL"),
            vec![Value::Bool(true), Value::Bool(false)]
        );
        assert_eq!(engine.stats().reconnect_attempts, 4);
        assert_eq!(engine.stats().reconnects, 1);
    }
}
