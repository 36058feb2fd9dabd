use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use scoutdesk_common::{Publication, RecentIdea, Result, ScoutError, Topic};

use crate::infra::retry::with_retry;
use crate::traits::ScoutStore;

/// Ideas newer than this form the dedup reference set.
pub const RECENT_IDEA_WINDOW_DAYS: i64 = 7;

/// Everything a scout run needs to know about its publication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoutContext {
    pub publication: Publication,
    /// Active topics only, highest priority first.
    pub topics: Vec<Topic>,
    pub recent_ideas: Vec<RecentIdea>,
}

impl ScoutContext {
    pub fn has_topics(&self) -> bool {
        !self.topics.is_empty()
    }
}

/// Load a publication's context. `NotFound` if the publication is gone.
///
/// Zero active topics is not an error here; the caller decides what an empty
/// run means.
pub async fn load_context(
    store: &dyn ScoutStore,
    publication_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ScoutContext> {
    let since = now - Duration::days(RECENT_IDEA_WINDOW_DAYS);

    let mut context = with_retry("load_context", || store.load_context(publication_id, since))
        .await?
        .ok_or_else(|| ScoutError::NotFound(format!("publication {publication_id}")))?;

    context.topics.retain(|t| t.active);
    // Stable sort keeps the store's secondary order within a priority.
    context.topics.sort_by(|a, b| b.priority.cmp(&a.priority));

    info!(
        %publication_id,
        topics = context.topics.len(),
        recent_ideas = context.recent_ideas.len(),
        "Loaded scout context"
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use scoutdesk_common::{AutoPublishMode, TopicPriority};

    use super::*;
    use crate::testing::{publication, topic, MockStore};

    #[tokio::test]
    async fn missing_publication_is_not_found() {
        let store = MockStore::new();
        let err = load_context(&store, Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn topics_are_active_only_and_priority_ordered() {
        let publication = publication(AutoPublishMode::Draft);
        let mut inactive = topic(publication.id, "Old beat", TopicPriority::Urgent);
        inactive.active = false;

        let store = MockStore::new()
            .with_publication(publication.clone())
            .with_topic(topic(publication.id, "Normal beat", TopicPriority::Normal))
            .with_topic(inactive)
            .with_topic(topic(publication.id, "Hot beat", TopicPriority::Urgent))
            .with_topic(topic(publication.id, "Warm beat", TopicPriority::High));

        let context = load_context(&store, publication.id, Utc::now()).await.unwrap();
        let names: Vec<_> = context.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Hot beat", "Warm beat", "Normal beat"]);
    }

    #[tokio::test]
    async fn only_ideas_from_the_trailing_week_are_loaded() {
        let publication = publication(AutoPublishMode::Draft);
        let now = Utc::now();
        let store = MockStore::new()
            .with_publication(publication.clone())
            .with_idea_at(publication.id, "Fresh", "angle", now - Duration::days(2))
            .with_idea_at(publication.id, "Stale", "angle", now - Duration::days(9));

        let context = load_context(&store, publication.id, now).await.unwrap();
        let titles: Vec<_> = context.recent_ideas.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh"]);
        assert!(!context.has_topics());
    }
}
