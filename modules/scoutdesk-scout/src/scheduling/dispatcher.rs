//! Queue consumer: one workflow run per delivered message.
//!
//! A message is acked once its run is registered and spawned, not when the run
//! finishes. A message whose run could not be started stays unacked and comes
//! back after the visibility timeout.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scoutdesk_common::Result;

use crate::infra::retry::with_retry;
use crate::traits::ScoutMessage;
use crate::workflows::{execute_run, start_run, ScoutDeps, ScoutRunResult};

pub struct StartedRun {
    pub run_id: Uuid,
    pub publication_id: Uuid,
    pub handle: JoinHandle<Result<ScoutRunResult>>,
}

pub struct Dispatcher {
    deps: Arc<ScoutDeps>,
    batch_size: u32,
    visibility: Duration,
    /// Runs executing in this process. Resume skips them.
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl Dispatcher {
    pub fn new(deps: Arc<ScoutDeps>, batch_size: u32, visibility: Duration) -> Self {
        Self {
            deps,
            batch_size: batch_size.max(1),
            visibility,
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim one batch and start a run per message. Each message succeeds or
    /// fails on its own.
    pub async fn poll_once(&self) -> Result<Vec<StartedRun>> {
        let deliveries = self.deps.queue.receive(self.batch_size, self.visibility).await?;
        if deliveries.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = deliveries.len(), "Claimed scout messages");

        let mut started = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            match self.start(&delivery.message).await {
                Ok(run) => {
                    if let Err(e) = self.deps.queue.ack(delivery.id).await {
                        // The run is already going; a redelivery starts an
                        // independent duplicate whose writes are idempotent.
                        warn!(delivery_id = %delivery.id, run_id = %run.run_id, error = %e, "Ack failed");
                    }
                    started.push(run);
                }
                Err(e) => {
                    error!(
                        delivery_id = %delivery.id,
                        publication_id = %delivery.message.publication_id,
                        attempts = delivery.attempts,
                        error = %e,
                        "Failed to start scout run, leaving message for redelivery"
                    );
                }
            }
        }
        Ok(started)
    }

    /// Register a run for `message` and spawn it.
    pub async fn start(&self, message: &ScoutMessage) -> Result<StartedRun> {
        let run_id = start_run(&self.deps, message).await?;
        Ok(self.spawn(run_id, message.publication_id))
    }

    /// Re-execute registered runs whose heartbeat went stale, skipping any
    /// still running here. Completed steps replay from the journal.
    pub async fn resume_incomplete(&self, stale_before: DateTime<Utc>) -> Result<Vec<StartedRun>> {
        let pending = with_retry("incomplete_runs", || {
            self.deps.journal.incomplete_runs(stale_before)
        })
        .await?;

        let mut resumed = Vec::new();
        for run in pending {
            if self.is_active(run.run_id) {
                continue;
            }
            info!(run_id = %run.run_id, publication_id = %run.publication_id, "Resuming incomplete scout run");
            resumed.push(self.spawn(run.run_id, run.publication_id));
        }
        Ok(resumed)
    }

    /// Poll forever, sleeping `idle` whenever the queue is empty or unreachable.
    pub async fn run_forever(&self, idle: Duration) {
        loop {
            match self.poll_once().await {
                Ok(started) if !started.is_empty() => continue,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Queue poll failed"),
            }
            tokio::time::sleep(idle).await;
        }
    }

    fn is_active(&self, run_id: Uuid) -> bool {
        self.active
            .lock()
            .map(|active| active.contains(&run_id))
            .unwrap_or(false)
    }

    fn spawn(&self, run_id: Uuid, publication_id: Uuid) -> StartedRun {
        if let Ok(mut active) = self.active.lock() {
            active.insert(run_id);
        }

        let deps = self.deps.clone();
        let active = self.active.clone();
        let handle = tokio::spawn(async move {
            let result = execute_run(&deps, run_id, publication_id).await;
            if let Ok(mut active) = active.lock() {
                active.remove(&run_id);
            }
            result
        });

        StartedRun {
            run_id,
            publication_id,
            handle,
        }
    }
}
