use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use scoutdesk_common::{
    AutoPublishMode, Idea, IdeaSource, IdeaStatus, Publication, RecentIdea, Result, ScoutError,
    ScoutSchedule, SearchHit, Topic, TopicPriority,
};

use crate::infra::retry::storage_error;
use crate::pipeline::context::ScoutContext;
use crate::traits::{NewIdea, ScoutStore, SearchCache, SearchKind};

const PUBLICATION_COLUMNS: &str = "id, user_id, name, description, auto_publish_mode, \
     cadence_posts_per_week, scout_schedule, timezone, next_scout_at";

const IDEA_COLUMNS: &str = "id, publication_id, topic_id, title, angle, summary, sources, \
     relevance_score, status, session_id, created_at, updated_at";

/// Publications, topics, ideas, sessions and the search cache.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ScoutError::Database(e.to_string()))
    }
}

// --- Row mapping ---

fn publication_from_row(row: &PgRow) -> Result<Publication> {
    let id: Uuid = row.try_get("id").map_err(storage_error)?;

    let mode: String = row.try_get("auto_publish_mode").map_err(storage_error)?;
    let auto_publish_mode = AutoPublishMode::from_db(&mode).unwrap_or_else(|| {
        warn!(publication_id = %id, mode = %mode, "Unknown auto-publish mode, treating as draft");
        AutoPublishMode::Draft
    });

    let schedule: serde_json::Value = row.try_get("scout_schedule").map_err(storage_error)?;
    let scout_schedule = serde_json::from_value(schedule).unwrap_or_else(|e| {
        warn!(publication_id = %id, error = %e, "Unreadable scout schedule, using default");
        ScoutSchedule::default()
    });

    let cadence: i32 = row.try_get("cadence_posts_per_week").map_err(storage_error)?;

    Ok(Publication {
        id,
        user_id: row.try_get("user_id").map_err(storage_error)?,
        name: row.try_get("name").map_err(storage_error)?,
        description: row.try_get("description").map_err(storage_error)?,
        auto_publish_mode,
        cadence_posts_per_week: u32::try_from(cadence).unwrap_or(0),
        scout_schedule,
        timezone: row.try_get("timezone").map_err(storage_error)?,
        next_scout_at: row.try_get("next_scout_at").map_err(storage_error)?,
    })
}

fn topic_from_row(row: &PgRow) -> Result<Topic> {
    let priority: String = row.try_get("priority").map_err(storage_error)?;
    Ok(Topic {
        id: row.try_get("id").map_err(storage_error)?,
        publication_id: row.try_get("publication_id").map_err(storage_error)?,
        name: row.try_get("name").map_err(storage_error)?,
        description: row.try_get("description").map_err(storage_error)?,
        priority: TopicPriority::from_db(&priority),
        active: row.try_get("active").map_err(storage_error)?,
    })
}

fn idea_from_row(row: &PgRow) -> Result<Idea> {
    let id: Uuid = row.try_get("id").map_err(storage_error)?;

    let sources: serde_json::Value = row.try_get("sources").map_err(storage_error)?;
    let sources: Vec<IdeaSource> = serde_json::from_value(sources).unwrap_or_else(|e| {
        warn!(idea_id = %id, error = %e, "Unreadable idea sources");
        Vec::new()
    });

    let status: String = row.try_get("status").map_err(storage_error)?;

    Ok(Idea {
        id,
        publication_id: row.try_get("publication_id").map_err(storage_error)?,
        topic_id: row.try_get("topic_id").map_err(storage_error)?,
        title: row.try_get("title").map_err(storage_error)?,
        angle: row.try_get("angle").map_err(storage_error)?,
        summary: row.try_get("summary").map_err(storage_error)?,
        sources,
        relevance_score: row.try_get("relevance_score").map_err(storage_error)?,
        status: IdeaStatus::from_db(&status).unwrap_or(IdeaStatus::New),
        session_id: row.try_get("session_id").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        updated_at: row.try_get("updated_at").map_err(storage_error)?,
    })
}

#[async_trait]
impl ScoutStore for PgStore {
    async fn load_context(
        &self,
        publication_id: Uuid,
        ideas_since: DateTime<Utc>,
    ) -> Result<Option<ScoutContext>> {
        // One snapshot for all three reads.
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        let row = sqlx::query(&format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications WHERE id = $1"
        ))
        .bind(publication_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(storage_error)?;
            return Ok(None);
        };
        let publication = publication_from_row(&row)?;

        let topics = sqlx::query(
            "SELECT id, publication_id, name, description, priority, active
             FROM topics
             WHERE publication_id = $1 AND active
             ORDER BY CASE priority WHEN 'urgent' THEN 0 WHEN 'high' THEN 1 ELSE 2 END,
                      created_at, name",
        )
        .bind(publication_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?
        .iter()
        .map(topic_from_row)
        .collect::<Result<Vec<_>>>()?;

        let recent_ideas = sqlx::query(
            "SELECT id, title, angle
             FROM ideas
             WHERE publication_id = $1 AND created_at >= $2
             ORDER BY created_at DESC",
        )
        .bind(publication_id)
        .bind(ideas_since)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_error)?
        .iter()
        .map(|row| {
            Ok(RecentIdea {
                id: row.try_get("id").map_err(storage_error)?,
                title: row.try_get("title").map_err(storage_error)?,
                angle: row.try_get("angle").map_err(storage_error)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        tx.commit().await.map_err(storage_error)?;

        Ok(Some(ScoutContext {
            publication,
            topics,
            recent_ideas,
        }))
    }

    async fn publication(&self, publication_id: Uuid) -> Result<Option<Publication>> {
        sqlx::query(&format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications WHERE id = $1"
        ))
        .bind(publication_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?
        .as_ref()
        .map(publication_from_row)
        .transpose()
    }

    async fn publications_missing_schedule(&self) -> Result<Vec<Publication>> {
        sqlx::query(&format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications WHERE next_scout_at IS NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?
        .iter()
        .map(publication_from_row)
        .collect()
    }

    async fn due_publications(&self, now: i64) -> Result<Vec<Publication>> {
        sqlx::query(&format!(
            "SELECT {PUBLICATION_COLUMNS} FROM publications
             WHERE next_scout_at IS NOT NULL AND next_scout_at <= $1
             ORDER BY next_scout_at, id"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?
        .iter()
        .map(publication_from_row)
        .collect()
    }

    async fn set_next_scout_at(&self, publication_id: Uuid, next_scout_at: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE publications SET next_scout_at = $2, updated_at = now() WHERE id = $1",
        )
        .bind(publication_id)
        .bind(next_scout_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ScoutError::NotFound(format!("publication {publication_id}")));
        }
        Ok(())
    }

    async fn update_schedule(
        &self,
        publication_id: Uuid,
        schedule: &ScoutSchedule,
        timezone: &str,
        next_scout_at: Option<i64>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE publications
             SET scout_schedule = $2,
                 timezone = $3,
                 next_scout_at = COALESCE($4, next_scout_at),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(publication_id)
        .bind(serde_json::to_value(schedule)?)
        .bind(timezone)
        .bind(next_scout_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ScoutError::NotFound(format!("publication {publication_id}")));
        }
        Ok(())
    }

    async fn publication_ids_page(&self, after: Option<Uuid>, limit: u32) -> Result<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM publications
             WHERE $1::uuid IS NULL OR id > $1
             ORDER BY id
             LIMIT $2",
        )
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn insert_idea_if_absent(&self, idea: &NewIdea) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO ideas
                (id, publication_id, topic_id, title, angle, summary, sources, relevance_score, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'new')
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(idea.id)
        .bind(idea.publication_id)
        .bind(idea.topic_id)
        .bind(&idea.title)
        .bind(&idea.angle)
        .bind(&idea.summary)
        .bind(serde_json::to_value(&idea.sources)?)
        .bind(idea.relevance_score)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn idea(&self, idea_id: Uuid) -> Result<Option<Idea>> {
        sqlx::query(&format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = $1"))
            .bind(idea_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?
            .as_ref()
            .map(idea_from_row)
            .transpose()
    }

    async fn mark_idea_promoted(&self, idea_id: Uuid, session_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ideas SET status = 'promoted', session_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(idea_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        if result.rows_affected() == 0 {
            return Err(ScoutError::NotFound(format!("idea {idea_id}")));
        }
        Ok(())
    }

    async fn completed_sessions_since(
        &self,
        publication_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sessions
             WHERE publication_id = $1 AND status = 'completed' AND updated_at >= $2",
        )
        .bind(publication_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl SearchCache for PgStore {
    async fn get(&self, cache_key: &str, now: DateTime<Utc>) -> Result<Option<Vec<SearchHit>>> {
        let response: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT response FROM search_cache WHERE cache_key = $1 AND expires_at > $2",
        )
        .bind(cache_key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(response) = response else {
            return Ok(None);
        };
        match serde_json::from_value(response) {
            Ok(hits) => Ok(Some(hits)),
            Err(e) => {
                warn!(cache_key, error = %e, "Unreadable cached search response, ignoring");
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        cache_key: &str,
        kind: SearchKind,
        query: &str,
        hits: &[SearchHit],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_cache (cache_key, kind, query, response, expires_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (cache_key)
             DO UPDATE SET response = EXCLUDED.response,
                           expires_at = EXCLUDED.expires_at,
                           created_at = now()",
        )
        .bind(cache_key)
        .bind(kind.as_str())
        .bind(query)
        .bind(serde_json::to_value(hits)?)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}
