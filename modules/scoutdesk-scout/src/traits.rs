// Trait seams for the scout core's collaborators.
//
// - ScoutStore: publications, topics, ideas and sessions (Postgres in production)
// - SearchCache: 24h cache of research-provider responses
// - SearchProvider, DraftingAgent: outbound HTTP collaborators
// - WorkQueue: at-least-once delivery of scout messages
// - StepJournal: run registry plus per-step outputs, so a crashed run resumes
//   at its first incomplete step
//
// The in-memory versions in `testing` let the whole pipeline run with no
// network and no database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scoutdesk_common::{Idea, IdeaSource, Publication, Result, ScoutSchedule, SearchHit};

use crate::pipeline::context::ScoutContext;

pub use ai_client::LanguageModel;

// ---------------------------------------------------------------------------
// ScoutStore
// ---------------------------------------------------------------------------

/// Parameters for an insert-if-absent idea write.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdea {
    pub id: Uuid,
    pub publication_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub angle: String,
    pub summary: String,
    pub sources: Vec<IdeaSource>,
    pub relevance_score: f64,
}

#[async_trait]
pub trait ScoutStore: Send + Sync {
    // --- Context ---

    /// Publication row, active topics (highest priority first) and ideas
    /// created at or after `ideas_since`, read as one unit.
    /// `None` when the publication does not exist.
    async fn load_context(
        &self,
        publication_id: Uuid,
        ideas_since: DateTime<Utc>,
    ) -> Result<Option<ScoutContext>>;

    async fn publication(&self, publication_id: Uuid) -> Result<Option<Publication>>;

    // --- Scheduling ---

    /// Publications that have never had a next run computed.
    async fn publications_missing_schedule(&self) -> Result<Vec<Publication>>;

    /// Publications whose next run is at or before `now` (epoch seconds).
    async fn due_publications(&self, now: i64) -> Result<Vec<Publication>>;

    async fn set_next_scout_at(&self, publication_id: Uuid, next_scout_at: i64) -> Result<()>;

    /// Persist a schedule/timezone change. `next_scout_at = None` leaves the
    /// stored next run untouched.
    async fn update_schedule(
        &self,
        publication_id: Uuid,
        schedule: &ScoutSchedule,
        timezone: &str,
        next_scout_at: Option<i64>,
    ) -> Result<()>;

    /// Publication ids in id order, after `after`, at most `limit`.
    async fn publication_ids_page(&self, after: Option<Uuid>, limit: u32) -> Result<Vec<Uuid>>;

    // --- Ideas ---

    /// Single-statement insert keyed by `idea.id`. Returns whether a row was added.
    async fn insert_idea_if_absent(&self, idea: &NewIdea) -> Result<bool>;

    async fn idea(&self, idea_id: Uuid) -> Result<Option<Idea>>;

    async fn mark_idea_promoted(&self, idea_id: Uuid, session_id: &str) -> Result<()>;

    // --- Sessions ---

    /// Sessions for the publication with status `completed` updated at or after `since`.
    async fn completed_sessions_since(&self, publication_id: Uuid, since: DateTime<Utc>)
        -> Result<u32>;
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Recency-filtered news, small result cap.
    News,
    /// Broader web search over a longer window.
    Web,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Web => "web",
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, kind: SearchKind, query: &str) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait SearchCache: Send + Sync {
    /// Cached hits for `cache_key` that have not expired at `now`.
    async fn get(&self, cache_key: &str, now: DateTime<Utc>) -> Result<Option<Vec<SearchHit>>>;

    async fn put(
        &self,
        cache_key: &str,
        kind: SearchKind,
        query: &str,
        hits: &[SearchHit],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DraftingAgent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSession {
    pub user_id: Uuid,
    pub title: String,
    pub publication_id: Uuid,
    pub idea_id: Uuid,
    pub seed_context: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub version: u32,
    pub is_final: bool,
}

#[async_trait]
pub trait DraftingAgent: Send + Sync {
    /// Returns the new session id.
    async fn create_session(&self, request: &CreateSession) -> Result<String>;

    async fn send_message(&self, session_id: &str, message: &str) -> Result<()>;

    async fn list_drafts(&self, session_id: &str) -> Result<Vec<DraftSummary>>;

    async fn publish(&self, session_id: &str, slug: &str, author: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// WorkQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoutTrigger {
    Cron,
    Manual,
    RunAll,
}

impl ScoutTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Manual => "manual",
            Self::RunAll => "run-all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoutMessage {
    pub publication_id: Uuid,
    pub trigger: ScoutTrigger,
}

impl ScoutMessage {
    pub fn new(publication_id: Uuid, trigger: ScoutTrigger) -> Self {
        Self {
            publication_id,
            trigger,
        }
    }
}

/// A claimed message. Invisible to other consumers until acked or until the
/// visibility timeout lapses.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: Uuid,
    pub message: ScoutMessage,
    pub attempts: u32,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, message: &ScoutMessage) -> Result<Uuid>;

    async fn enqueue_batch(&self, messages: &[ScoutMessage]) -> Result<usize>;

    async fn receive(&self, max: u32, visibility: Duration) -> Result<Vec<Delivery>>;

    async fn ack(&self, delivery_id: Uuid) -> Result<()>;
}

// ---------------------------------------------------------------------------
// StepJournal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Skipped,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// A run that was started but never finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRun {
    pub run_id: Uuid,
    pub publication_id: Uuid,
}

#[async_trait]
pub trait StepJournal: Send + Sync {
    /// Register a run. Idempotent per `run_id`.
    async fn start_run(&self, run_id: Uuid, publication_id: Uuid, trigger: ScoutTrigger)
        -> Result<()>;

    async fn load_step(&self, run_id: Uuid, step: &str) -> Result<Option<serde_json::Value>>;

    /// Persist a step output and refresh the run heartbeat.
    async fn save_step(&self, run_id: Uuid, step: &str, output: &serde_json::Value) -> Result<()>;

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<()>;

    /// Runs still marked running whose heartbeat is older than `stale_before`.
    async fn incomplete_runs(&self, stale_before: DateTime<Utc>) -> Result<Vec<PendingRun>>;
}
