//! End-to-end scout runs against the in-memory doubles.
//!
//! Each test builds a `Harness`, runs one publication through
//! load-context → search → dedup → generate → store → auto-write, then asserts
//! on what landed in the store, the journal and the drafting agent.

use chrono::{Duration, Utc};
use scoutdesk_common::{AutoPublishMode, IdeaStatus, ScoutError, TopicPriority};
use scoutdesk_scout::infra::ids::idea_id;
use scoutdesk_scout::pipeline::auto_write::AutoWriteOutcome;
use scoutdesk_scout::testing::{
    brief, ideas_json, publication, search_hits, topic, DraftScript, Harness, MockDrafting,
    MockLlm, MockSearch, MockStore,
};
use scoutdesk_scout::traits::{RunStatus, ScoutMessage, ScoutTrigger, SearchKind};
use scoutdesk_scout::workflows::{execute_run, run_scout, ScoutDeps, SkipReason};
use uuid::Uuid;

const TOPIC: &str = "AI tooling";

fn two_ideas() -> String {
    ideas_json(&[
        brief("Top idea", TOPIC, 0.9),
        brief("Second idea", TOPIC, 0.6),
    ])
}

/// One publication with one high-priority topic; `extra` adds per-test rows.
fn harness(
    mode: AutoPublishMode,
    extra: impl FnOnce(MockStore, Uuid) -> MockStore,
    llm: MockLlm,
    drafting: MockDrafting,
) -> (Harness, Uuid) {
    let publication = publication(mode);
    let id = publication.id;
    let store = extra(
        MockStore::new()
            .with_publication(publication)
            .with_topic(topic(id, TOPIC, TopicPriority::High)),
        id,
    );
    let search = MockSearch::new().with_default_hits(search_hits("story", 3));
    (Harness::new(store, search, llm, drafting), id)
}

fn manual(publication_id: Uuid) -> ScoutMessage {
    ScoutMessage::new(publication_id, ScoutTrigger::Manual)
}

// ---------------------------------------------------------------------------
// Draft mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn draft_mode_stores_ideas_and_never_drafts() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (run_id, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    let summary = result.summary().expect("completed run");
    assert_eq!(summary.ideas_generated, 2);
    assert_eq!(summary.ideas_inserted, 2);
    assert_eq!(summary.auto_written, 0);
    assert!(summary.auto_write.is_none());

    let ideas = h.store.ideas();
    assert_eq!(ideas.len(), 2);
    assert!(ideas.iter().all(|i| i.status == IdeaStatus::New));
    assert_eq!(h.drafting.total_calls(), 0);

    // No recent ideas, so dedup never asks the model.
    assert_eq!(h.llm.dedup_calls(), 0);

    let run = h.journal.run(run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.unwrap()["status"], "completed");
}

#[tokio::test]
async fn rerun_with_same_ideas_inserts_nothing() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );
    let deps = h.deps();

    run_scout(&deps, &manual(pub_id)).await.unwrap();
    let (_, second) = run_scout(&deps, &manual(pub_id)).await.unwrap();

    let summary = second.summary().unwrap();
    assert_eq!(summary.ideas_generated, 2);
    assert_eq!(summary.ideas_inserted, 0);
    assert_eq!(h.store.ideas().len(), 2);
    // Second run has a reference set, so dedup consults the model.
    assert_eq!(h.llm.dedup_calls(), 1);
}

// ---------------------------------------------------------------------------
// Skips
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publication_without_active_topics_is_skipped() {
    let publication = publication(AutoPublishMode::Draft);
    let pub_id = publication.id;
    let mut retired = topic(pub_id, TOPIC, TopicPriority::Normal);
    retired.active = false;
    let h = Harness::new(
        MockStore::new().with_publication(publication).with_topic(retired),
        MockSearch::new(),
        MockLlm::new(),
        MockDrafting::new(),
    );

    let (run_id, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.skip_reason(), Some(SkipReason::NoActiveTopics));
    assert_eq!(h.search.calls(), 0);
    assert_eq!(h.journal.run(run_id).unwrap().status, RunStatus::Skipped);
}

#[tokio::test]
async fn every_story_dropped_skips_generation() {
    let publication = publication(AutoPublishMode::Publish);
    let pub_id = publication.id;
    let store = MockStore::new()
        .with_publication(publication)
        .with_topic(topic(pub_id, TOPIC, TopicPriority::Normal))
        .with_idea_at(pub_id, "Old take", "old angle", Utc::now() - Duration::days(1));
    let search = MockSearch::new()
        .with_hits(SearchKind::News, search_hits("story", 2))
        .with_hits(SearchKind::Web, vec![]);
    let llm = MockLlm::new()
        .on_dedup(
            r#"{"decisions": [
                {"index": 1, "verdict": "drop", "reason": "covered"},
                {"index": 2, "verdict": "drop", "reason": "covered"}
            ]}"#,
        )
        .on_ideas(&two_ideas());
    let h = Harness::new(store, search, llm, MockDrafting::new());

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.skip_reason(), Some(SkipReason::NoNewStories));
    assert_eq!(h.llm.idea_calls(), 0);
    assert_eq!(h.drafting.total_calls(), 0);
}

#[tokio::test]
async fn unusable_model_output_skips_with_no_ideas() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s,
        MockLlm::new().on_ideas("I could not think of anything today."),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.skip_reason(), Some(SkipReason::NoIdeasGenerated));
    assert!(h.store.ideas().is_empty());
}

// ---------------------------------------------------------------------------
// Degradation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dedup_outage_lets_every_story_through() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, id| s.with_idea_at(id, "Earlier", "earlier angle", Utc::now() - Duration::hours(3)),
        MockLlm::new().failing_dedup().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert!(h.llm.dedup_calls() >= 1);
    assert_eq!(result.summary().unwrap().ideas_inserted, 2);
}

#[tokio::test]
async fn partial_search_outage_still_produces_ideas() {
    let publication = publication(AutoPublishMode::Draft);
    let pub_id = publication.id;
    let h = Harness::new(
        MockStore::new()
            .with_publication(publication)
            .with_topic(topic(pub_id, TOPIC, TopicPriority::High)),
        MockSearch::new()
            .with_default_hits(search_hits("story", 3))
            .failing_kind(SearchKind::Web),
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.summary().unwrap().ideas_generated, 2);
}

#[tokio::test]
async fn transient_model_failure_is_retried() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s,
        MockLlm::new().flaky_ideas(1).on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(h.llm.idea_calls(), 2);
    assert_eq!(result.summary().unwrap().ideas_inserted, 2);
}

#[tokio::test]
async fn transient_store_failure_is_retried() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s.failing_inserts(2),
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.summary().unwrap().ideas_inserted, 2);
    assert_eq!(h.store.ideas().len(), 2);
}

// ---------------------------------------------------------------------------
// Auto-write
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_mode_drafts_and_promotes_the_top_idea() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );
    let user_id = h.store.publication_row(pub_id).unwrap().user_id;

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.auto_written, 1);

    let top_id = idea_id(pub_id, "Top idea", "Top idea angle");
    match summary.auto_write.as_ref().unwrap() {
        AutoWriteOutcome::Published { idea_id, session_id, slug, .. } => {
            assert_eq!(*idea_id, top_id);
            assert_eq!(session_id, "session-1");
            assert_eq!(slug, "top-idea");
        }
        other => panic!("expected Published, got {other:?}"),
    }

    let sessions = h.drafting.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].idea_id, top_id);
    assert!(sessions[0].seed_context.contains("**Title:** Top idea"));

    let messages = h.drafting.messages();
    assert_eq!(messages.len(), 1, "exactly one instruction per session");
    assert_eq!(messages[0].0, "session-1");
    assert!(messages[0].1.contains("Top idea angle"));

    assert_eq!(
        h.drafting.published(),
        vec![("session-1".to_string(), "top-idea".to_string(), user_id.to_string())]
    );

    let top = h.store.idea_row(top_id).unwrap();
    assert_eq!(top.status, IdeaStatus::Promoted);
    assert_eq!(top.session_id.as_deref(), Some("session-1"));

    let second = h
        .store
        .idea_row(idea_id(pub_id, "Second idea", "Second idea angle"))
        .unwrap();
    assert_eq!(second.status, IdeaStatus::New);
}

#[tokio::test]
async fn full_auto_stops_at_weekly_cadence() {
    // Quota is 3 posts per week; three sessions completed just now.
    let (h, pub_id) = harness(
        AutoPublishMode::FullAuto,
        |s, id| s.with_completed_sessions(id, 3, Utc::now()),
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.ideas_inserted, 2);
    assert_eq!(summary.auto_written, 0);
    assert_eq!(
        summary.auto_write,
        Some(AutoWriteOutcome::CadenceReached { completed: 3, quota: 3 })
    );
    assert_eq!(h.drafting.total_calls(), 0);
}

#[tokio::test]
async fn full_auto_under_quota_publishes() {
    let publication = publication(AutoPublishMode::FullAuto);
    let pub_id = publication.id;
    let h = Harness::new(
        MockStore::new()
            .with_publication(publication)
            .with_topic(topic(pub_id, TOPIC, TopicPriority::High))
            .with_completed_sessions(pub_id, 2, Utc::now())
            // Last month's sessions do not count toward this week.
            .with_completed_sessions(pub_id, 5, Utc::now() - Duration::days(30)),
        MockSearch::new().with_default_hits(search_hits("story", 3)),
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(result.summary().unwrap().auto_written, 1);
    assert_eq!(h.drafting.published().len(), 1);
}

#[tokio::test]
async fn draft_that_never_appears_fails_the_run_without_publishing() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::scripted(DraftScript::Never),
    );

    let err = run_scout(&h.deps(), &manual(pub_id)).await.unwrap_err();

    assert!(matches!(err, ScoutError::DraftTimeout(_)), "got {err:?}");
    // One session, one instruction, one poll window: the step is not retried.
    assert_eq!(h.drafting.sessions().len(), 1);
    assert_eq!(h.drafting.messages().len(), 1);
    assert_eq!(h.drafting.polls(), 3);
    assert!(h.drafting.published().is_empty());
    assert!(h
        .store
        .ideas()
        .iter()
        .all(|i| i.status == IdeaStatus::New));
    // Ideas were stored before auto-write began.
    assert_eq!(h.store.ideas().len(), 2);
}

#[tokio::test]
async fn publish_rejection_abandons_the_session_without_retrying() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new().failing_publish(),
    );

    let err = run_scout(&h.deps(), &manual(pub_id)).await.unwrap_err();

    match err {
        ScoutError::SessionAbandoned { session_id, .. } => assert_eq!(session_id, "session-1"),
        other => panic!("expected SessionAbandoned, got {other:?}"),
    }
    assert_eq!(h.drafting.sessions().len(), 1);
    assert_eq!(h.drafting.messages().len(), 1);
    assert!(h.store.ideas().iter().all(|i| i.status == IdeaStatus::New));
}

#[tokio::test]
async fn session_create_failure_is_retried_then_fails_the_run() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new().failing_create(),
    );

    let err = run_scout(&h.deps(), &manual(pub_id)).await.unwrap_err();

    assert!(matches!(err, ScoutError::UpstreamUnavailable(_)), "got {err:?}");
    assert!(h.drafting.sessions().is_empty());
    assert!(h.drafting.messages().is_empty());
    assert_eq!(h.journal.run_count(), 1);
    let run_id = h.journal.run_ids()[0];
    assert_eq!(h.journal.run(run_id).unwrap().status, RunStatus::Failed);
}

#[tokio::test]
async fn already_promoted_top_idea_is_not_published_again() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, id| s.with_promoted_idea(id, "Top idea", "Top idea angle", "session-earlier"),
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::new(),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.auto_written, 0);
    let top_id = idea_id(pub_id, "Top idea", "Top idea angle");
    assert_eq!(
        summary.auto_write,
        Some(AutoWriteOutcome::AlreadyHandled {
            idea_id: top_id,
            status: IdeaStatus::Promoted,
        })
    );
    assert_eq!(h.drafting.total_calls(), 0);
    assert_eq!(
        h.store.idea_row(top_id).unwrap().session_id.as_deref(),
        Some("session-earlier")
    );
}

#[tokio::test]
async fn non_final_drafts_publish_the_newest_at_poll_limit() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::scripted(DraftScript::NonFinalOnly),
    );

    let (_, result) = run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    match result.summary().unwrap().auto_write.as_ref().unwrap() {
        AutoWriteOutcome::Published { draft_version, .. } => assert_eq!(*draft_version, 2),
        other => panic!("expected Published, got {other:?}"),
    }
    assert_eq!(h.drafting.polls(), 3);
}

#[tokio::test]
async fn final_draft_stops_polling_early() {
    let (h, pub_id) = harness(
        AutoPublishMode::Publish,
        |s, _| s,
        MockLlm::new().on_ideas(&two_ideas()),
        MockDrafting::scripted(DraftScript::FinalAfter(2)),
    );

    run_scout(&h.deps(), &manual(pub_id)).await.unwrap();

    assert_eq!(h.drafting.polls(), 2);
    assert_eq!(h.drafting.published().len(), 1);
}

// ---------------------------------------------------------------------------
// Durability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resumed_run_replays_completed_steps() {
    let (h, pub_id) = harness(
        AutoPublishMode::Draft,
        |s, _| s,
        MockLlm::new().failing_ideas(),
        MockDrafting::new(),
    );

    let err = run_scout(&h.deps(), &manual(pub_id)).await.unwrap_err();
    assert!(matches!(err, ScoutError::UpstreamUnavailable(_)));
    let searches = h.search.calls();
    assert_eq!(searches, 2);
    // Two retries after the first attempt.
    assert_eq!(h.llm.idea_calls(), 3);

    assert!(h.store.ideas().is_empty());
    let run_id = h.journal.run_ids()[0];
    assert_eq!(h.journal.run(run_id).unwrap().status, RunStatus::Failed);

    // Same journal and store, model now healthy.
    let recovered = std::sync::Arc::new(MockLlm::new().on_ideas(&two_ideas()));
    let deps = ScoutDeps::builder()
        .store(h.store.clone())
        .queue(h.queue.clone())
        .journal(h.journal.clone())
        .search(h.search.clone())
        .search_cache(h.cache.clone())
        .llm(recovered.clone())
        .drafting(h.drafting.clone())
        .policies(h.deps().policies)
        .build();

    let result = execute_run(&deps, run_id, pub_id).await.unwrap();

    assert_eq!(result.summary().unwrap().ideas_inserted, 2);
    assert_eq!(h.search.calls(), searches, "search output replayed from the journal");
    assert_eq!(recovered.idea_calls(), 1);
    assert_eq!(h.journal.run(run_id).unwrap().status, RunStatus::Completed);
}
