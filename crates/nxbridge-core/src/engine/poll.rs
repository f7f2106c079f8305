// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Poll loop.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{CachedValue, EngineStats, SyncEngine};
use crate::error::ControllerError;

/// Result of one poll cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Every tag was read; changed values were published.
    Completed {
        /// Number of values published.
        published: usize,
    },
    /// The link was lost mid-cycle; nothing from this cycle was published.
    Aborted(ControllerError),
    /// The gateway was not connected; no tag was read.
    Skipped,
}

impl SyncEngine {
    /// Runs one poll cycle.
    ///
    /// Reads every bound tag in order, then publishes each value that differs
    /// from the last known value. The first completed cycle publishes
    /// everything and then marks the engine ready. Tags that fail to read are
    /// logged and skipped. A connectivity or protocol failure aborts the cycle
    /// and discards what was read so far.
    pub async fn poll_once(&self) -> CycleOutcome {
        let mut state = self.state.lock().await;

        if !state.gateway.state().is_connected() {
            EngineStats::incr(&self.stats.cycles_skipped);
            return CycleOutcome::Skipped;
        }

        // Reading
        let mut readings = Vec::with_capacity(self.registry.len());
        for (tag, node) in self.registry.bound() {
            match state.gateway.read_tag(tag).await {
                Ok(value) => readings.push((tag, node, value)),
                Err(e) if e.triggers_reconnect() => {
                    warn!(
                        tag = %tag.name(),
                        error = %e,
                        discarded = readings.len(),
                        "Poll cycle aborted"
                    );
                    EngineStats::incr(&self.stats.cycles_aborted);
                    return CycleOutcome::Aborted(e);
                }
                Err(e) => {
                    warn!(tag = %tag.name(), error = %e, "Tag read failed, skipped");
                    EngineStats::incr(&self.stats.read_failures);
                }
            }
        }

        // Publishing
        let first_cycle = !self.ready.load(Ordering::Acquire);
        let mut published = 0;
        for (tag, node, value) in readings {
            let changed = first_cycle
                || state
                    .cache
                    .get(tag.name())
                    .map_or(true, |cached| !cached.value.same_as(&value));
            if !changed {
                continue;
            }

            let mark = self.poll_publishes.fetch_add(1, Ordering::AcqRel) + 1;
            match self.publisher.set_value(node, &value) {
                Ok(()) => {
                    debug!(tag = %tag.name(), value = %value, "Published");
                    state.cache.insert(
                        tag.name().to_string(),
                        CachedValue {
                            value,
                            polled_at: mark,
                        },
                    );
                    published += 1;
                }
                Err(e) => {
                    warn!(tag = %tag.name(), node = %node, error = %e, "Publish failed");
                }
            }
        }
        self.stats
            .values_published
            .fetch_add(published as u64, Ordering::Relaxed);
        EngineStats::incr(&self.stats.cycles_completed);

        if first_cycle {
            self.ready.store(true, Ordering::Release);
            info!(tags = self.registry.len(), published, "Initial poll complete, accepting writes");
        }

        CycleOutcome::Completed { published }
    }

    /// Runs the poll loop until shutdown.
    ///
    /// Ticks every `poll_interval`; a tick that is late because of a slow
    /// cycle or a reconnect is delayed rather than bursted. An aborted or
    /// skipped cycle hands off to [`recover`](Self::recover).
    pub async fn run_poll_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Poll loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                CycleOutcome::Completed { .. } => {}
                CycleOutcome::Aborted(_) | CycleOutcome::Skipped => {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        result = self.recover() => {
                            if let Err(e) = result {
                                error!(error = %e, "Reconnect gave up, retrying next cycle");
                            }
                        }
                    }
                }
            }
        }

        info!("Poll loop stopped");
    }
}
