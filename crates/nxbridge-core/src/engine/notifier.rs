// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change notifier.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{CachedValue, EngineStats, SyncEngine};
use crate::error::{ControllerError, PublisherResult};
use crate::publisher::{ChangeCallback, ChangeNotification};

/// What the notifier did with one notification.
#[derive(Debug)]
pub enum ChangeOutcome {
    /// The first poll cycle has not completed yet.
    NotReady,
    /// The node is not bound to any tag.
    UnknownNode,
    /// The value equals the last known value.
    Echo,
    /// The value was written to the controller.
    Written,
    /// The controller session is being re-established.
    Unavailable,
    /// The write was rejected or failed.
    Failed(ControllerError),
}

impl SyncEngine {
    /// Subscribes to every bound tag node.
    ///
    /// Returns the queue the publisher's callbacks feed; pass it to
    /// [`run_change_notifier`](Self::run_change_notifier). The health node is
    /// not subscribed.
    pub fn subscribe_all(&self) -> PublisherResult<mpsc::UnboundedReceiver<ChangeNotification>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for (_, node) in self.registry.bound() {
            let tx = tx.clone();
            let poll_publishes = self.poll_publishes.clone();
            let callback: ChangeCallback = Arc::new(move |mut notification| {
                notification.queued_after = Some(poll_publishes.load(Ordering::Acquire));
                if let Err(mpsc::error::SendError(dropped)) = tx.send(notification) {
                    debug!(node = %dropped.node, "Change notifier stopped, notification dropped");
                }
            });
            self.publisher.subscribe(node, callback)?;
        }
        Ok(rx)
    }

    /// Handles one change notification.
    ///
    /// Runs entirely under the engine lock. A value equal to the last known
    /// value is an echo of a publish and is discarded; anything else is
    /// written to the controller once, without retry. After a successful
    /// write the last known value is the written value, unless the poll loop
    /// republished the tag after the notification was queued.
    pub async fn handle_change(&self, notification: ChangeNotification) -> ChangeOutcome {
        let mut state = self.state.lock().await;

        if !self.ready.load(Ordering::Acquire) {
            debug!(node = %notification.node, "Notification before initial poll, ignored");
            EngineStats::incr(&self.stats.notifications_ignored);
            return ChangeOutcome::NotReady;
        }

        let Some(tag) = self.registry.resolve_node(&notification.node) else {
            warn!(node = %notification.node, "Notification for unknown node, ignored");
            EngineStats::incr(&self.stats.notifications_ignored);
            return ChangeOutcome::UnknownNode;
        };

        let queued_after = notification.queued_after;
        let value = notification.payload.into_value();
        let is_echo = tag
            .data_type()
            .coerce(&value)
            .zip(state.cache.get(tag.name()))
            .map_or(false, |(incoming, cached)| incoming.same_as(&cached.value));
        if is_echo {
            EngineStats::incr(&self.stats.echoes_suppressed);
            return ChangeOutcome::Echo;
        }

        if !state.gateway.state().is_connected() {
            warn!(
                tag = %tag.name(),
                value = %value,
                state = %state.gateway.state(),
                "Controller unavailable, write discarded"
            );
            EngineStats::incr(&self.stats.writes_failed);
            return ChangeOutcome::Unavailable;
        }

        match state.gateway.write_tag(tag, &value).await {
            Ok(written) => {
                info!(tag = %tag.name(), value = %written, "Client write forwarded");
                match state.cache.get_mut(tag.name()) {
                    Some(cached) if queued_after.map_or(false, |mark| cached.polled_at > mark) => {
                        debug!(
                            tag = %tag.name(),
                            polled = %cached.value,
                            "Tag republished since the write was queued, keeping polled value"
                        );
                    }
                    Some(cached) => cached.value = written,
                    None => {
                        state.cache.insert(
                            tag.name().to_string(),
                            CachedValue {
                                value: written,
                                polled_at: 0,
                            },
                        );
                    }
                }
                EngineStats::incr(&self.stats.writes_forwarded);
                ChangeOutcome::Written
            }
            Err(e) => {
                warn!(tag = %tag.name(), value = %value, error = %e, "Client write failed");
                EngineStats::incr(&self.stats.writes_failed);
                if e.triggers_reconnect() {
                    self.publish_health(true);
                }
                ChangeOutcome::Failed(e)
            }
        }
    }

    /// Runs the change notifier until shutdown or until the queue closes.
    pub async fn run_change_notifier(
        self: Arc<Self>,
        mut notifications: mpsc::UnboundedReceiver<ChangeNotification>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Change notifier started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                next = notifications.recv() => match next {
                    Some(notification) => {
                        self.handle_change(notification).await;
                    }
                    None => break,
                },
            }
        }
        info!("Change notifier stopped");
    }
}
