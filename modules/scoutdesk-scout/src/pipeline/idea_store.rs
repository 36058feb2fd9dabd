//! Idempotent persistence of idea briefs.
//!
//! Ids are derived from publication, title and angle, so re-running generation
//! and storage after a retry either inserts nothing or only the delta. Writes go
//! one statement at a time to keep each lock short.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use scoutdesk_common::{IdeaBrief, Result, Topic};

use crate::infra::ids::idea_id;
use crate::infra::retry::with_retry;
use crate::traits::{NewIdea, ScoutStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreOutcome {
    pub requested: usize,
    pub inserted: usize,
    /// Ids of every brief, new or pre-existing, in brief order without repeats.
    pub idea_ids: Vec<Uuid>,
}

pub async fn store_ideas(
    store: &dyn ScoutStore,
    publication_id: Uuid,
    briefs: &[IdeaBrief],
    topics: &[Topic],
) -> Result<StoreOutcome> {
    let mut outcome = StoreOutcome {
        requested: briefs.len(),
        inserted: 0,
        idea_ids: Vec::with_capacity(briefs.len()),
    };

    for brief in briefs {
        let idea = new_idea(publication_id, brief, topics);
        if outcome.idea_ids.contains(&idea.id) {
            continue;
        }

        let inserted = with_retry("insert_idea", || store.insert_idea_if_absent(&idea)).await?;
        if inserted {
            outcome.inserted += 1;
        } else {
            debug!(idea_id = %idea.id, title = %idea.title, "Idea already stored");
        }
        outcome.idea_ids.push(idea.id);
    }

    info!(
        %publication_id,
        requested = outcome.requested,
        inserted = outcome.inserted,
        "Ideas stored"
    );
    Ok(outcome)
}

/// Insert parameters for `brief`, with the topic resolved by exact name.
pub fn new_idea(publication_id: Uuid, brief: &IdeaBrief, topics: &[Topic]) -> NewIdea {
    NewIdea {
        id: idea_id(publication_id, &brief.title, &brief.angle),
        publication_id,
        topic_id: topics.iter().find(|t| t.name == brief.topic).map(|t| t.id),
        title: brief.title.clone(),
        angle: brief.angle.clone(),
        summary: brief.summary.clone(),
        sources: brief.sources.clone(),
        relevance_score: brief.relevance_score,
    }
}

#[cfg(test)]
mod tests {
    use scoutdesk_common::{AutoPublishMode, IdeaStatus, TopicPriority};

    use super::*;
    use crate::testing::{brief, publication, topic, MockStore};

    #[tokio::test]
    async fn storing_twice_inserts_once() {
        let publication = publication(AutoPublishMode::Draft);
        let topics = vec![topic(publication.id, "AI tooling", TopicPriority::Normal)];
        let store = MockStore::new().with_publication(publication.clone());
        let briefs = vec![brief("First", "AI tooling", 0.9), brief("Second", "AI tooling", 0.6)];

        let first = store_ideas(&store, publication.id, &briefs, &topics).await.unwrap();
        assert_eq!(first.inserted, 2);

        let second = store_ideas(&store, publication.id, &briefs, &topics).await.unwrap();
        assert_eq!(second.requested, 2);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.idea_ids, first.idea_ids);
        assert_eq!(store.ideas().len(), 2);
    }

    #[tokio::test]
    async fn unmatched_topic_stores_null_topic_id() {
        let publication = publication(AutoPublishMode::Draft);
        let topics = vec![topic(publication.id, "AI tooling", TopicPriority::Normal)];
        let store = MockStore::new().with_publication(publication.clone());

        let outcome = store_ideas(
            &store,
            publication.id,
            &[brief("Matched", "AI tooling", 0.5), brief("Loose", "ai tooling", 0.5)],
            &topics,
        )
        .await
        .unwrap();

        let matched = store.idea_row(outcome.idea_ids[0]).unwrap();
        let loose = store.idea_row(outcome.idea_ids[1]).unwrap();
        assert_eq!(matched.topic_id, Some(topics[0].id));
        assert_eq!(loose.topic_id, None, "topic match is exact");
        assert_eq!(loose.status, IdeaStatus::New);
    }

    #[tokio::test]
    async fn transient_contention_is_retried() {
        let publication = publication(AutoPublishMode::Draft);
        let store = MockStore::new()
            .with_publication(publication.clone())
            .failing_inserts(2);

        let outcome = store_ideas(&store, publication.id, &[brief("Only", "x", 0.5)], &[])
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 1);
    }

    #[tokio::test]
    async fn repeated_brief_in_one_batch_is_counted_once() {
        let publication = publication(AutoPublishMode::Draft);
        let store = MockStore::new().with_publication(publication.clone());
        let briefs = vec![brief("Same", "x", 0.5), brief("Same", "x", 0.8)];

        let outcome = store_ideas(&store, publication.id, &briefs, &[]).await.unwrap();
        assert_eq!(outcome.requested, 2);
        assert_eq!(outcome.idea_ids.len(), 1);
        assert_eq!(outcome.inserted, 1);
    }
}
