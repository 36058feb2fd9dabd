//! Turn deduped stories into ranked idea briefs.
//!
//! The model's output is validated entry by entry. An unreadable response is
//! "nothing generated" rather than an error; a failed call is an upstream
//! outage the step retry can absorb.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use ai_client::util::extract_json;
use scoutdesk_common::{FilteredStory, IdeaBrief, IdeaSource, Publication, Result, ScoutError, Topic};

use crate::traits::LanguageModel;

pub fn build_system_prompt(publication: &Publication) -> String {
    let about = publication
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description provided.");

    format!(
        r#"You are the ideas editor for "{name}".

About the publication: {about}

From the stories provided, propose 3 to 5 content ideas the publication could write next, ranked by how well they fit its audience and how timely they are.

Respond with JSON only: an array of objects with these fields:
- title: working headline
- angle: the specific take that makes this worth writing
- summary: two or three sentences on what the piece covers
- topic: exactly one of the topic names listed in the request
- relevance_score: number between 0 and 1
- sources: array of {{"url", "title", "snippet"}} taken from the stories you used"#,
        name = publication.name,
    )
}

pub fn build_user_prompt(stories: &[FilteredStory], topics: &[Topic]) -> String {
    let mut prompt = String::from("## Topics\n\n");
    for topic in topics {
        match topic.description.as_deref() {
            Some(d) if !d.trim().is_empty() => {
                prompt.push_str(&format!("- {} ({}): {}\n", topic.name, topic.priority.as_str(), d))
            }
            _ => prompt.push_str(&format!("- {} ({})\n", topic.name, topic.priority.as_str())),
        }
    }

    prompt.push_str("\n## Stories\n\n");
    for (i, story) in stories.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {}\n   URL: {}\n",
            i + 1,
            story.topic,
            story.title,
            story.url
        ));
        if let Some(date) = &story.date {
            prompt.push_str(&format!("   Date: {date}\n"));
        }
        prompt.push_str(&format!("   {}\n", story.snippet));
    }
    prompt
}

pub struct IdeaGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl IdeaGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        stories: &[FilteredStory],
        topics: &[Topic],
        publication: &Publication,
    ) -> Result<Vec<IdeaBrief>> {
        let system = build_system_prompt(publication);
        let user = build_user_prompt(stories, topics);

        let response = self.llm.complete(&system, &user).await.map_err(|e| {
            ScoutError::UpstreamUnavailable(format!("idea generation ({}): {e}", self.llm.model_name()))
        })?;

        let briefs = match parse_idea_briefs(&response) {
            Some(briefs) => briefs,
            None => {
                warn!(publication_id = %publication.id, "Idea response unreadable, treating as zero ideas");
                Vec::new()
            }
        };

        info!(
            publication_id = %publication.id,
            stories = stories.len(),
            ideas = briefs.len(),
            "Ideas generated"
        );
        Ok(briefs)
    }
}

/// `None` for an unreadable response; otherwise every entry that validates.
pub fn parse_idea_briefs(response: &str) -> Option<Vec<IdeaBrief>> {
    let value: Value = serde_json::from_str(extract_json(response)?).ok()?;
    let entries = match &value {
        Value::Array(items) => items,
        Value::Object(map) => map.get("ideas")?.as_array()?,
        _ => return None,
    };

    Some(entries.iter().filter_map(validate_brief).collect())
}

fn validate_brief(entry: &Value) -> Option<IdeaBrief> {
    let title = non_empty(entry, "title")?;
    let angle = non_empty(entry, "angle")?;
    let summary = non_empty(entry, "summary")?;

    let topic = entry
        .get("topic")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();

    let score = entry
        .get("relevance_score")
        .or_else(|| entry.get("relevanceScore"))
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let sources = entry
        .get("sources")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_source).collect())
        .unwrap_or_default();

    Some(IdeaBrief {
        title,
        angle,
        summary,
        topic,
        relevance_score: score,
        sources,
    })
}

fn parse_source(entry: &Value) -> Option<IdeaSource> {
    let url = non_empty(entry, "url")?;
    let title = non_empty(entry, "title").unwrap_or_else(|| url.clone());
    let snippet = non_empty(entry, "snippet").unwrap_or_default();
    Some(IdeaSource { url, title, snippet })
}

fn non_empty(entry: &Value, key: &str) -> Option<String> {
    let s = entry.get(key)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}
