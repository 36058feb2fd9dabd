//! Durable scout workflow runs.
//!
//! Each run is an explicit sequence of journaled steps (`runner`) driven by
//! `scout_run`. Runs hold `ScoutDeps` and build their per-run pipeline pieces
//! from it.

pub mod runner;
pub mod scout_run;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use ai_client::Claude;
use scoutdesk_common::Config;
use sqlx::PgPool;
use typed_builder::TypedBuilder;

use crate::clients::{HttpDraftingAgent, HttpSearchProvider};
use crate::pipeline::auto_write::AutoWriteConfig;
use crate::store::{PgStepJournal, PgStore, PgWorkQueue};
use crate::traits::{
    DraftingAgent, LanguageModel, ScoutStore, SearchCache, SearchProvider, StepJournal, WorkQueue,
};

pub use runner::{StepPolicy, StepRunner, WorkflowPolicies};
pub use scout_run::{execute_run, run_scout, start_run};
pub use types::{RunSummary, ScoutRunResult, ScoutStep, SkipInfo, SkipReason};

/// Shared dependency container for scout runs, the scheduler and the dispatcher.
///
/// Every collaborator sits behind a trait object so tests can swap in the
/// in-memory versions from `testing`.
#[derive(Clone, TypedBuilder)]
pub struct ScoutDeps {
    pub store: Arc<dyn ScoutStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub journal: Arc<dyn StepJournal>,
    pub search: Arc<dyn SearchProvider>,
    pub search_cache: Arc<dyn SearchCache>,
    pub llm: Arc<dyn LanguageModel>,
    pub drafting: Arc<dyn DraftingAgent>,
    #[builder(default)]
    pub policies: WorkflowPolicies,
    #[builder(default)]
    pub auto_write: AutoWriteConfig,
}

impl ScoutDeps {
    /// Production wiring: Postgres for storage, queue and journal; HTTP
    /// clients for search, LLM and the drafting agent.
    pub fn from_config(pool: PgPool, config: &Config) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));

        Self::builder()
            .store(store.clone())
            .queue(Arc::new(PgWorkQueue::new(pool.clone())))
            .journal(Arc::new(PgStepJournal::new(pool)))
            .search(Arc::new(HttpSearchProvider::new(
                config.search_base_url.clone(),
                config.search_api_key.clone(),
            )))
            .search_cache(store)
            .llm(Arc::new(Claude::new(
                config.anthropic_api_key.clone(),
                config.llm_model.clone(),
            )))
            .drafting(Arc::new(HttpDraftingAgent::new(
                config.drafting_agent_url.clone(),
                config.drafting_agent_token.clone(),
            )))
            .auto_write(AutoWriteConfig {
                poll_interval: Duration::from_secs(config.draft_poll_interval_secs),
                max_poll_attempts: config.draft_poll_attempts,
            })
            .build()
    }
}
