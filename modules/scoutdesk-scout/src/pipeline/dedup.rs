//! Semantic dedup of fresh stories against the trailing week of ideas.
//!
//! Fails open: a failed or unreadable LLM call lets every story through, and a
//! story the model didn't rule on is kept.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use ai_client::util::extract_json;
use scoutdesk_common::{FilteredStory, RecentIdea, SearchHit, TopicResults};

use crate::traits::LanguageModel;

pub(crate) const SYSTEM_PROMPT: &str = r#"You are an editorial deduplication assistant. A publication has already generated a set of content ideas this week. You are given a numbered list of freshly found stories and the list of existing ideas.

For every story decide whether it is already represented by an existing idea (same underlying news, same angle) or is genuinely new material.

Respond with JSON only, in this shape:
{"decisions": [{"index": 1, "verdict": "keep", "reason": "..."}, {"index": 2, "verdict": "drop", "reason": "..."}]}

- index: the story number from the list
- verdict: "keep" for new material, "drop" for stories already covered
- reason: one short sentence

When unsure, keep the story."#;

#[derive(Debug, Default)]
pub struct DedupStats {
    pub input: usize,
    pub kept: usize,
    pub dropped: usize,
    pub failed_open: bool,
}

impl fmt::Display for DedupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dedup: {} stories in, {} kept, {} dropped{}",
            self.input,
            self.kept,
            self.dropped,
            if self.failed_open { " (failed open)" } else { "" },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Keep,
    Drop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupDecision {
    /// 1-based position in the numbered story list.
    pub index: usize,
    pub verdict: Verdict,
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecisionPayload {
    Wrapped { decisions: Vec<DedupDecision> },
    Bare(Vec<DedupDecision>),
}

pub struct DedupFilter {
    llm: Arc<dyn LanguageModel>,
}

impl DedupFilter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Stories from `results` that are not already covered by `recent_ideas`.
    pub async fn filter(
        &self,
        results: &[TopicResults],
        recent_ideas: &[RecentIdea],
    ) -> Vec<FilteredStory> {
        let stories = flatten_stories(results);
        let mut stats = DedupStats {
            input: stories.len(),
            ..Default::default()
        };

        if stories.is_empty() || recent_ideas.is_empty() {
            stats.kept = stories.len();
            info!(%stats, "No recent ideas to dedup against, keeping all stories");
            return stories;
        }

        let prompt = build_prompt(&stories, recent_ideas);
        let decisions = match self.llm.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(response) => parse_decisions(&response),
            Err(e) => {
                warn!(error = %e, model = self.llm.model_name(), "Dedup LLM call failed");
                None
            }
        };

        let Some(decisions) = decisions else {
            stats.kept = stories.len();
            stats.failed_open = true;
            warn!(%stats, "Dedup unavailable, passing every story through");
            return stories;
        };

        let kept = apply_decisions(stories, &decisions);
        stats.kept = kept.len();
        stats.dropped = stats.input - stats.kept;
        info!(%stats, "Dedup complete");
        kept
    }
}

/// Every news and web hit in topic order, tagged with its topic.
pub fn flatten_stories(results: &[TopicResults]) -> Vec<FilteredStory> {
    results
        .iter()
        .flat_map(|r| {
            r.news
                .iter()
                .chain(r.web.iter())
                .map(move |hit| story_from_hit(hit, &r.topic_name))
        })
        .collect()
}

fn story_from_hit(hit: &SearchHit, topic: &str) -> FilteredStory {
    FilteredStory {
        title: hit.title.clone(),
        snippet: hit.snippet.clone(),
        url: hit.url.clone(),
        date: hit.date.clone(),
        topic: topic.to_string(),
    }
}

pub fn build_prompt(stories: &[FilteredStory], recent_ideas: &[RecentIdea]) -> String {
    let mut prompt = String::from("## New stories\n\n");
    for (i, story) in stories.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {}\n   {}\n",
            i + 1,
            story.topic,
            story.title,
            story.snippet,
        ));
    }

    prompt.push_str("\n## Existing ideas\n\n");
    for idea in recent_ideas {
        prompt.push_str(&format!("- {} (angle: {})\n", idea.title, idea.angle));
    }
    prompt
}

/// `None` when the response holds no readable decision list.
pub fn parse_decisions(response: &str) -> Option<Vec<DedupDecision>> {
    let json = extract_json(response)?;
    match serde_json::from_str::<DecisionPayload>(json) {
        Ok(DecisionPayload::Wrapped { decisions }) | Ok(DecisionPayload::Bare(decisions)) => {
            Some(decisions)
        }
        Err(e) => {
            debug!(error = %e, "Unreadable dedup decisions");
            None
        }
    }
}

/// Drop only the stories with an explicit `drop` verdict.
pub fn apply_decisions(stories: Vec<FilteredStory>, decisions: &[DedupDecision]) -> Vec<FilteredStory> {
    let dropped: HashSet<usize> = decisions
        .iter()
        .filter(|d| d.verdict == Verdict::Drop)
        .inspect(|d| debug!(index = d.index, reason = %d.reason, "Story dropped as duplicate"))
        .map(|d| d.index)
        .collect();

    stories
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped.contains(&(i + 1)))
        .map(|(_, story)| story)
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::testing::{search_hits, topic_results, MockLlm};

    fn recent() -> Vec<RecentIdea> {
        vec![RecentIdea {
            id: Uuid::new_v4(),
            title: "Agents in the IDE".into(),
            angle: "What changes for juniors".into(),
        }]
    }

    fn results() -> Vec<TopicResults> {
        vec![topic_results("AI tooling", search_hits("story", 3))]
    }

    #[tokio::test]
    async fn empty_reference_set_skips_the_llm() {
        let llm = Arc::new(MockLlm::new().failing_dedup());
        let filter = DedupFilter::new(llm.clone());

        let kept = filter.filter(&results(), &[]).await;
        assert_eq!(kept.len(), 3);
        assert_eq!(llm.dedup_calls(), 0);
    }

    #[tokio::test]
    async fn drop_verdicts_remove_stories() {
        let llm = Arc::new(MockLlm::new().on_dedup(
            r#"```json
{"decisions": [{"index": 2, "verdict": "drop", "reason": "covered"}, {"index": 1, "verdict": "keep"}]}
```"#,
        ));
        let filter = DedupFilter::new(llm);

        let kept = filter.filter(&results(), &recent()).await;
        let titles: Vec<_> = kept.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["story 1", "story 3"]);
        assert!(kept.iter().all(|s| s.topic == "AI tooling"));
    }

    #[tokio::test]
    async fn unparseable_response_fails_open() {
        let llm = Arc::new(MockLlm::new().on_dedup("I think they're all fine!"));
        let kept = DedupFilter::new(llm).filter(&results(), &recent()).await;
        assert_eq!(kept.len(), 3);
    }

    #[tokio::test]
    async fn llm_failure_fails_open() {
        let llm = Arc::new(MockLlm::new().failing_dedup());
        let kept = DedupFilter::new(llm.clone()).filter(&results(), &recent()).await;
        assert_eq!(kept.len(), 3);
        assert_eq!(llm.dedup_calls(), 1);
    }

    #[test]
    fn bare_array_and_unknown_verdicts() {
        let decisions = parse_decisions(
            r#"[{"index": 1, "verdict": "maybe"}, {"index": 3, "verdict": "drop"}]"#,
        )
        .unwrap();
        assert_eq!(decisions[0].verdict, Verdict::Unknown);

        let stories = flatten_stories(&results());
        let kept = apply_decisions(stories, &decisions);
        assert_eq!(kept.len(), 2, "unknown verdicts keep the story");
    }

    #[test]
    fn out_of_range_indexes_are_ignored() {
        let decisions = parse_decisions(r#"{"decisions":[{"index":0,"verdict":"drop"},{"index":9,"verdict":"drop"}]}"#)
            .unwrap();
        let kept = apply_decisions(flatten_stories(&results()), &decisions);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn prompt_numbers_stories_from_one() {
        let prompt = build_prompt(&flatten_stories(&results()), &recent());
        assert!(prompt.contains("1. [AI tooling] story 1"));
        assert!(prompt.contains("3. [AI tooling] story 3"));
        assert!(prompt.contains("- Agents in the IDE (angle: What changes for juniors)"));
    }
}
