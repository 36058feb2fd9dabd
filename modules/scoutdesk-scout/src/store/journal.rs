//! Run registry and per-step output journal.
//!
//! One `scout_runs` row per run; one `scout_run_steps` row per completed step.
//! Saving a step refreshes the run's heartbeat, which is what crash recovery
//! uses to tell a stalled run from a slow one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use scoutdesk_common::Result;

use crate::infra::retry::storage_error;
use crate::traits::{PendingRun, RunStatus, ScoutTrigger, StepJournal};

#[derive(Clone)]
pub struct PgStepJournal {
    pool: PgPool,
}

impl PgStepJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepJournal for PgStepJournal {
    async fn start_run(
        &self,
        run_id: Uuid,
        publication_id: Uuid,
        trigger: ScoutTrigger,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO scout_runs (run_id, publication_id, trigger, status)
             VALUES ($1, $2, $3, 'running')
             ON CONFLICT (run_id) DO UPDATE SET heartbeat_at = now()",
        )
        .bind(run_id)
        .bind(publication_id)
        .bind(trigger.as_str())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn load_step(&self, run_id: Uuid, step: &str) -> Result<Option<serde_json::Value>> {
        sqlx::query_scalar("SELECT output FROM scout_run_steps WHERE run_id = $1 AND step = $2")
            .bind(run_id)
            .bind(step)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn save_step(&self, run_id: Uuid, step: &str, output: &serde_json::Value) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        sqlx::query(
            "INSERT INTO scout_run_steps (run_id, step, output)
             VALUES ($1, $2, $3)
             ON CONFLICT (run_id, step)
             DO UPDATE SET output = EXCLUDED.output, completed_at = now()",
        )
        .bind(run_id)
        .bind(step)
        .bind(output)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        sqlx::query("UPDATE scout_runs SET heartbeat_at = now() WHERE run_id = $1")
            .bind(run_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scout_runs
             SET status = $2, result = $3, error = $4, finished_at = now(), heartbeat_at = now()
             WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(status.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        info!(%run_id, status = status.as_str(), "Scout run recorded");
        Ok(())
    }

    async fn incomplete_runs(&self, stale_before: DateTime<Utc>) -> Result<Vec<PendingRun>> {
        let rows = sqlx::query(
            "SELECT run_id, publication_id FROM scout_runs
             WHERE status = 'running' AND heartbeat_at < $1
             ORDER BY started_at",
        )
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows.iter()
            .map(|row| {
                Ok(PendingRun {
                    run_id: row.try_get("run_id").map_err(storage_error)?,
                    publication_id: row.try_get("publication_id").map_err(storage_error)?,
                })
            })
            .collect()
    }
}
