// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! OS signals (SIGTERM and SIGINT, or Ctrl+C on Windows) and internal
//! failures both end in [`ShutdownCoordinator::initiate_shutdown`], which
//! notifies every subscribed task once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info, warn};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Coordinates graceful shutdown across the bridge's tasks.
///
/// # Example
///
/// ```ignore
/// use nxbridge_bin::shutdown::ShutdownCoordinator;
///
/// let coordinator = ShutdownCoordinator::new();
/// tokio::spawn(engine.clone().run_poll_loop(coordinator.subscribe()));
///
/// coordinator.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Initiates shutdown. Only the first call notifies subscribers.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.sender.send(());
        }
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Waits for an OS signal or an internal [`initiate_shutdown`] call,
    /// then initiates shutdown.
    ///
    /// [`initiate_shutdown`]: Self::initiate_shutdown
    pub async fn wait_for_shutdown(&self) {
        let mut manual = self.sender.subscribe();
        if self.is_shutdown_initiated() {
            return;
        }

        tokio::select! {
            _ = os_signal() => {}
            _ = manual.recv() => {}
        }

        self.initiate_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to register signal handlers, falling back to Ctrl+C");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// ShutdownGuard
// =============================================================================

/// Initiates shutdown when dropped.
///
/// Held by each long-running task so that a task ending on its own, by
/// panic or otherwise, takes the whole process down with it.
pub struct ShutdownGuard {
    coordinator: ShutdownCoordinator,
    task: &'static str,
}

impl ShutdownGuard {
    /// Creates a guard for the named task.
    pub fn new(coordinator: ShutdownCoordinator, task: &'static str) -> Self {
        Self { coordinator, task }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        if !self.coordinator.is_shutdown_initiated() {
            warn!(task = self.task, "Task stopped unexpectedly, initiating shutdown");
            self.coordinator.initiate_shutdown();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_shutdown_initiated());
        coordinator.initiate_shutdown();

        assert!(coordinator.is_shutdown_initiated());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_returns_on_manual_shutdown() {
        let coordinator = ShutdownCoordinator::new();

        let trigger = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.initiate_shutdown();
        });

        tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown())
            .await
            .expect("wait_for_shutdown should return");
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();
        coordinator.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn test_guard_triggers_on_drop() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        let guard = ShutdownGuard::new(coordinator.clone(), "poll loop");
        tokio::spawn(async move {
            let _guard = guard;
            panic!("task failure");
        })
        .await
        .unwrap_err();

        assert!(coordinator.is_shutdown_initiated());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();

        assert!(rx.recv().await.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
