//! One scout run for one publication.
//!
//! load-context → search-content → dedupe-stories → generate-ideas →
//! store-ideas → [auto-write], each a journaled step. "Nothing to do" ends the
//! run with a `Skipped` result; only real failures return an error.

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use scoutdesk_common::{AutoPublishMode, FilteredStory, IdeaBrief, Result, ScoutError, TopicResults};

use super::runner::StepRunner;
use super::types::{RunSummary, ScoutRunResult, ScoutStep, SkipReason};
use super::ScoutDeps;
use crate::infra::retry::with_retry;
use crate::pipeline::auto_write::{AutoWriteOutcome, AutoWriter};
use crate::pipeline::context::{load_context, ScoutContext};
use crate::pipeline::dedup::DedupFilter;
use crate::pipeline::idea_store::{store_ideas, StoreOutcome};
use crate::pipeline::ideas::IdeaGenerator;
use crate::pipeline::search::SearchAggregator;
use crate::traits::{RunStatus, ScoutMessage};

/// Register a new run for `message`. Once this returns, the run exists in the
/// registry and can be executed or resumed.
pub async fn start_run(deps: &ScoutDeps, message: &ScoutMessage) -> Result<Uuid> {
    let run_id = Uuid::new_v4();
    with_retry("start_run", || {
        deps.journal
            .start_run(run_id, message.publication_id, message.trigger)
    })
    .await?;

    info!(
        %run_id,
        publication_id = %message.publication_id,
        trigger = message.trigger.as_str(),
        "Scout run started"
    );
    Ok(run_id)
}

/// Register and execute a run to completion.
pub async fn run_scout(deps: &ScoutDeps, message: &ScoutMessage) -> Result<(Uuid, ScoutRunResult)> {
    let run_id = start_run(deps, message).await?;
    let result = execute_run(deps, run_id, message.publication_id).await?;
    Ok((run_id, result))
}

/// Execute (or resume) a registered run and record its final status.
pub async fn execute_run(deps: &ScoutDeps, run_id: Uuid, publication_id: Uuid) -> Result<ScoutRunResult> {
    let outcome = execute_steps(deps, run_id, publication_id).await;

    let recorded = match &outcome {
        Ok(result) => {
            let status = match result {
                ScoutRunResult::Completed(_) => RunStatus::Completed,
                ScoutRunResult::Skipped(info) => {
                    info!(%run_id, %publication_id, reason = %info.reason, "Scout run skipped");
                    RunStatus::Skipped
                }
            };
            let json = serde_json::to_value(result)?;
            deps.journal.finish_run(run_id, status, Some(&json), None).await
        }
        Err(e) => {
            error!(%run_id, %publication_id, error = %e, "Scout run failed");
            deps.journal
                .finish_run(run_id, RunStatus::Failed, None, Some(&e.to_string()))
                .await
        }
    };
    if let Err(e) = recorded {
        warn!(%run_id, error = %e, "Failed to record scout run status");
    }

    outcome
}

async fn execute_steps(deps: &ScoutDeps, run_id: Uuid, publication_id: Uuid) -> Result<ScoutRunResult> {
    let steps = StepRunner::new(deps.journal.as_ref(), run_id);
    let policies = &deps.policies;
    let store = deps.store.as_ref();

    // --- load-context ---
    let context: ScoutContext = steps
        .run(ScoutStep::LoadContext, policies.load_context, || {
            load_context(store, publication_id, Utc::now())
        })
        .await?;
    if !context.has_topics() {
        return Ok(ScoutRunResult::skipped(publication_id, SkipReason::NoActiveTopics));
    }
    let publication = &context.publication;
    let topics = context.topics.as_slice();

    // --- search-content ---
    let aggregator = SearchAggregator::new(deps.search.clone(), deps.search_cache.clone());
    let aggregator = &aggregator;
    let results: Vec<TopicResults> = steps
        .run(ScoutStep::SearchContent, policies.search, || {
            aggregator.search_topics(topics, Utc::now())
        })
        .await?;

    // --- dedupe-stories ---
    let dedup = DedupFilter::new(deps.llm.clone());
    let (dedup, results, recent) = (&dedup, results.as_slice(), context.recent_ideas.as_slice());
    let stories: Vec<FilteredStory> = steps
        .run(ScoutStep::DedupeStories, policies.dedup, move || async move {
            Ok::<_, ScoutError>(dedup.filter(results, recent).await)
        })
        .await?;
    if stories.is_empty() {
        return Ok(ScoutRunResult::skipped(publication_id, SkipReason::NoNewStories));
    }

    // --- generate-ideas ---
    let generator = IdeaGenerator::new(deps.llm.clone());
    let (generator, stories) = (&generator, stories.as_slice());
    let briefs: Vec<IdeaBrief> = steps
        .run(ScoutStep::GenerateIdeas, policies.generate, || {
            generator.generate(stories, topics, publication)
        })
        .await?;
    if briefs.is_empty() {
        return Ok(ScoutRunResult::skipped(publication_id, SkipReason::NoIdeasGenerated));
    }

    // --- store-ideas ---
    let briefs = briefs.as_slice();
    let stored: StoreOutcome = steps
        .run(ScoutStep::StoreIdeas, policies.store, || {
            store_ideas(store, publication_id, briefs, topics)
        })
        .await?;

    // --- auto-write ---
    let auto_write = if publication.auto_publish_mode == AutoPublishMode::Draft {
        None
    } else {
        let writer = AutoWriter::new(deps.store.clone(), deps.drafting.clone(), deps.auto_write);
        let writer = &writer;
        let outcome: AutoWriteOutcome = steps
            .run(ScoutStep::AutoWrite, policies.auto_write, || {
                writer.run(publication, briefs, Utc::now())
            })
            .await?;
        Some(outcome)
    };

    let auto_written = usize::from(auto_write.as_ref().is_some_and(AutoWriteOutcome::is_published));
    info!(
        %run_id,
        %publication_id,
        ideas_generated = briefs.len(),
        ideas_inserted = stored.inserted,
        auto_written,
        "Scout run completed"
    );

    Ok(ScoutRunResult::Completed(RunSummary {
        publication_id,
        ideas_generated: briefs.len(),
        ideas_inserted: stored.inserted,
        idea_ids: stored.idea_ids,
        auto_written,
        auto_write,
    }))
}
