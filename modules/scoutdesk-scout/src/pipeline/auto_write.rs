//! Autonomous draft-and-publish of the run's best idea.
//!
//! Session creation, one instruction, bounded polling for a finished draft,
//! publish, then promote the idea. A failure after the session exists is
//! terminal for the step: the session stays behind and the idea stays `new` for
//! manual recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use scoutdesk_common::{AutoPublishMode, Idea, IdeaBrief, IdeaStatus, Publication, Result, ScoutError};

use crate::infra::ids::idea_id;
use crate::infra::retry::with_retry;
use crate::infra::util::{slugify, start_of_week};
use crate::traits::{CreateSession, DraftSummary, DraftingAgent, ScoutStore};

const DEFAULT_TONE: &str = "Match the publication's established voice";

#[derive(Debug, Clone, Copy)]
pub struct AutoWriteConfig {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
}

impl Default for AutoWriteConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoWriteOutcome {
    /// Publication is in draft mode.
    Disabled,
    /// Weekly quota already met. No remote calls were made.
    CadenceReached { completed: u32, quota: u32 },
    /// The top idea was already promoted or triaged by an earlier run.
    AlreadyHandled { idea_id: Uuid, status: IdeaStatus },
    Published {
        idea_id: Uuid,
        session_id: String,
        slug: String,
        draft_version: u32,
    },
}

impl AutoWriteOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

pub struct AutoWriter {
    store: Arc<dyn ScoutStore>,
    drafting: Arc<dyn DraftingAgent>,
    config: AutoWriteConfig,
}

impl AutoWriter {
    pub fn new(store: Arc<dyn ScoutStore>, drafting: Arc<dyn DraftingAgent>, config: AutoWriteConfig) -> Self {
        Self {
            store,
            drafting,
            config,
        }
    }

    pub async fn run(
        &self,
        publication: &Publication,
        briefs: &[IdeaBrief],
        now: DateTime<Utc>,
    ) -> Result<AutoWriteOutcome> {
        if publication.auto_publish_mode == AutoPublishMode::Draft {
            return Ok(AutoWriteOutcome::Disabled);
        }

        if publication.auto_publish_mode == AutoPublishMode::FullAuto {
            let since = start_of_week(now);
            let completed = with_retry("completed_sessions_since", || {
                self.store.completed_sessions_since(publication.id, since)
            })
            .await?;
            let quota = publication.cadence_posts_per_week;
            if completed >= quota {
                info!(
                    publication_id = %publication.id,
                    completed,
                    quota,
                    "Weekly cadence reached, skipping auto-write"
                );
                return Ok(AutoWriteOutcome::CadenceReached { completed, quota });
            }
        }

        let top = select_top_idea(briefs)
            .ok_or_else(|| ScoutError::ValidationEmpty("no idea briefs to write".into()))?;
        let id = idea_id(publication.id, &top.title, &top.angle);
        let idea = with_retry("load_idea", || self.store.idea(id))
            .await?
            .ok_or_else(|| ScoutError::NotFound(format!("idea {id}")))?;

        if idea.status != IdeaStatus::New {
            info!(
                publication_id = %publication.id,
                idea_id = %idea.id,
                status = idea.status.as_str(),
                "Top idea already handled, skipping auto-write"
            );
            return Ok(AutoWriteOutcome::AlreadyHandled {
                idea_id: idea.id,
                status: idea.status,
            });
        }

        let session_id = self
            .drafting
            .create_session(&CreateSession {
                user_id: publication.user_id,
                title: idea.title.clone(),
                publication_id: publication.id,
                idea_id: idea.id,
                seed_context: build_seed_brief(publication, &idea),
            })
            .await?;
        info!(publication_id = %publication.id, idea_id = %idea.id, %session_id, "Drafting session created");

        // Errors past this point must not retry into a second session.
        self.write_and_publish(publication, &idea, session_id).await
    }

    async fn write_and_publish(
        &self,
        publication: &Publication,
        idea: &Idea,
        session_id: String,
    ) -> Result<AutoWriteOutcome> {
        let abandon = |e: ScoutError| match e {
            ScoutError::DraftTimeout(_) | ScoutError::SessionAbandoned { .. } => e,
            other => ScoutError::SessionAbandoned {
                session_id: session_id.clone(),
                reason: other.to_string(),
            },
        };

        self.drafting
            .send_message(&session_id, &build_instruction(idea))
            .await
            .map_err(abandon)?;

        let draft = self.await_draft(&session_id).await.map_err(abandon)?;

        let slug = match slugify(&idea.title) {
            s if s.is_empty() => format!("idea-{}", idea.id.simple()),
            s => s,
        };
        self.drafting
            .publish(&session_id, &slug, &publication.user_id.to_string())
            .await
            .map_err(abandon)?;

        with_retry("mark_idea_promoted", || {
            self.store.mark_idea_promoted(idea.id, &session_id)
        })
        .await
        .map_err(abandon)?;

        info!(
            publication_id = %publication.id,
            idea_id = %idea.id,
            %session_id,
            %slug,
            draft_version = draft.version,
            is_final = draft.is_final,
            "Idea auto-written and published"
        );
        Ok(AutoWriteOutcome::Published {
            idea_id: idea.id,
            session_id,
            slug,
            draft_version: draft.version,
        })
    }

    /// Poll until a final draft shows up. After the last attempt, fall back to
    /// the newest draft seen; no draft at all is a `DraftTimeout`.
    pub async fn await_draft(&self, session_id: &str) -> Result<DraftSummary> {
        let mut last_seen: Vec<DraftSummary> = Vec::new();

        for attempt in 1..=self.config.max_poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            match self.drafting.list_drafts(session_id).await {
                Ok(drafts) => {
                    if let Some(done) = drafts.iter().filter(|d| d.is_final).max_by_key(|d| d.version) {
                        debug!(session_id, attempt, version = done.version, "Final draft ready");
                        return Ok(*done);
                    }
                    debug!(session_id, attempt, drafts = drafts.len(), "No final draft yet");
                    if !drafts.is_empty() {
                        last_seen = drafts;
                    }
                }
                Err(e) => warn!(session_id, attempt, error = %e, "Draft poll failed"),
            }
        }

        match last_seen.into_iter().max_by_key(|d| d.version) {
            Some(newest) => {
                warn!(
                    session_id,
                    version = newest.version,
                    "No final draft within the poll window, using newest draft"
                );
                Ok(newest)
            }
            None => Err(ScoutError::DraftTimeout(format!(
                "session {session_id} produced no draft after {} polls",
                self.config.max_poll_attempts
            ))),
        }
    }
}

/// Strictly highest relevance score; the earlier brief wins a tie.
pub fn select_top_idea(briefs: &[IdeaBrief]) -> Option<&IdeaBrief> {
    briefs.iter().fold(None, |best: Option<&IdeaBrief>, brief| match best {
        Some(b) if b.relevance_score >= brief.relevance_score => Some(b),
        _ => Some(brief),
    })
}

pub fn build_seed_brief(publication: &Publication, idea: &Idea) -> String {
    let tone = publication
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_TONE);

    let mut brief = format!(
        "# Content brief\n\n\
         **Publication:** {}\n\
         **Title:** {}\n\
         **Angle:** {}\n\
         **Tone:** {}\n\n\
         ## Summary\n\n{}\n",
        publication.name, idea.title, idea.angle, tone, idea.summary,
    );

    if !idea.sources.is_empty() {
        brief.push_str("\n## Sources\n\n");
        for (i, source) in idea.sources.iter().enumerate() {
            if source.snippet.is_empty() {
                brief.push_str(&format!("{}. [{}]({})\n", i + 1, source.title, source.url));
            } else {
                brief.push_str(&format!(
                    "{}. [{}]({}) — {}\n",
                    i + 1,
                    source.title,
                    source.url,
                    source.snippet
                ));
            }
        }
    }
    brief
}

pub fn build_instruction(idea: &Idea) -> String {
    format!(
        "Research \"{}\" using the brief and sources above, then write a complete, \
         publication-ready post that follows the angle: {}. Back every factual claim \
         with a citation to its source. Mark the draft as final when it is ready to publish.",
        idea.title, idea.angle
    )
}
