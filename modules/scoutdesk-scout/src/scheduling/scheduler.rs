//! Cron tick and manual triggers.
//!
//! Each due publication is advanced *before* its message is enqueued. A crash
//! between the two skips one cycle; the reverse order could run a slot twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use scoutdesk_common::{Publication, Result, ScoutError, ScoutSchedule};

use super::next_run::{compute_next_run, recompute_on_config_change};
use crate::infra::retry::with_retry;
use crate::traits::{ScoutMessage, ScoutStore, ScoutTrigger, WorkQueue};

/// Where a `next_scout_at` write came from, for the write log.
#[derive(Debug, Clone, Copy)]
enum WriteSite {
    Backfill,
    Advance,
    ConfigUpdate,
}

impl WriteSite {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Backfill => "backfill",
            Self::Advance => "advance",
            Self::ConfigUpdate => "config-update",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub backfilled: usize,
    pub due: usize,
    pub enqueued: usize,
    /// Due publications whose advance or enqueue failed. They run next cycle.
    pub failed: usize,
}

pub struct Scheduler {
    store: Arc<dyn ScoutStore>,
    queue: Arc<dyn WorkQueue>,
    run_all_batch_size: u32,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ScoutStore>, queue: Arc<dyn WorkQueue>, run_all_batch_size: u32) -> Self {
        Self {
            store,
            queue,
            run_all_batch_size: run_all_batch_size.max(1),
        }
    }

    /// One cron tick: backfill missing schedules, then advance and enqueue
    /// every due publication.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let mut report = TickReport::default();

        let missing = with_retry("publications_missing_schedule", || {
            self.store.publications_missing_schedule()
        })
        .await?;
        for publication in &missing {
            let next = compute_next_run(&publication.scout_schedule, &publication.timezone, now);
            match self.write_next_run(publication, next, WriteSite::Backfill).await {
                Ok(()) => report.backfilled += 1,
                Err(e) => warn!(publication_id = %publication.id, error = %e, "Schedule backfill failed"),
            }
        }

        let due = with_retry("due_publications", || self.store.due_publications(now.timestamp())).await?;
        report.due = due.len();
        for publication in &due {
            let next = compute_next_run(&publication.scout_schedule, &publication.timezone, now);
            if let Err(e) = self.write_next_run(publication, next, WriteSite::Advance).await {
                warn!(publication_id = %publication.id, error = %e, "Schedule advance failed, not enqueueing");
                report.failed += 1;
                continue;
            }

            match self
                .queue
                .enqueue(&ScoutMessage::new(publication.id, ScoutTrigger::Cron))
                .await
            {
                Ok(message_id) => {
                    info!(publication_id = %publication.id, %message_id, "Scheduled scout enqueued");
                    report.enqueued += 1;
                }
                Err(e) => {
                    warn!(
                        publication_id = %publication.id,
                        next_scout_at = next,
                        error = %e,
                        "Enqueue failed after advance, publication skips this cycle"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            backfilled = report.backfilled,
            due = report.due,
            enqueued = report.enqueued,
            failed = report.failed,
            "Cron tick complete"
        );
        Ok(report)
    }

    /// Enqueue one publication now, leaving its schedule alone.
    pub async fn run_now(&self, publication_id: Uuid) -> Result<Uuid> {
        with_retry("publication", || self.store.publication(publication_id))
            .await?
            .ok_or_else(|| ScoutError::NotFound(format!("publication {publication_id}")))?;

        let message_id = self
            .queue
            .enqueue(&ScoutMessage::new(publication_id, ScoutTrigger::Manual))
            .await?;
        info!(%publication_id, %message_id, "Manual scout enqueued");
        Ok(message_id)
    }

    /// Enqueue every publication in batches, leaving schedules alone.
    pub async fn run_all(&self) -> Result<usize> {
        let mut after = None;
        let mut total = 0usize;

        loop {
            let page = with_retry("publication_ids_page", || {
                self.store.publication_ids_page(after, self.run_all_batch_size)
            })
            .await?;
            let Some(last) = page.last().copied() else {
                break;
            };

            let messages: Vec<_> = page
                .iter()
                .map(|id| ScoutMessage::new(*id, ScoutTrigger::RunAll))
                .collect();
            total += self.queue.enqueue_batch(&messages).await?;
            after = Some(last);

            if page.len() < self.run_all_batch_size as usize {
                break;
            }
        }

        info!(enqueued = total, "Run-all scouts enqueued");
        Ok(total)
    }

    /// Persist a schedule/timezone change. Returns the new next run when it
    /// had to be recomputed.
    pub async fn update_schedule(
        &self,
        publication_id: Uuid,
        schedule: ScoutSchedule,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let publication = with_retry("publication", || self.store.publication(publication_id))
            .await?
            .ok_or_else(|| ScoutError::NotFound(format!("publication {publication_id}")))?;

        let next = recompute_on_config_change(&publication, &schedule, timezone, now);
        with_retry("update_schedule", || {
            self.store
                .update_schedule(publication_id, &schedule, timezone, next)
        })
        .await?;

        if let Some(next) = next {
            info!(
                %publication_id,
                old = ?publication.next_scout_at,
                new = next,
                site = WriteSite::ConfigUpdate.as_str(),
                "next_scout_at written"
            );
        }
        Ok(next)
    }

    async fn write_next_run(&self, publication: &Publication, next: i64, site: WriteSite) -> Result<()> {
        with_retry("set_next_scout_at", || {
            self.store.set_next_scout_at(publication.id, next)
        })
        .await?;

        info!(
            publication_id = %publication.id,
            old = ?publication.next_scout_at,
            new = next,
            site = site.as_str(),
            "next_scout_at written"
        );
        Ok(())
    }
}
