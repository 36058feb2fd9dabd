//! Step names and run results for scout workflow runs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::auto_write::AutoWriteOutcome;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Named, independently retriable units of a scout run, in execution order.
/// `as_str` values key the step journal, so they must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoutStep {
    LoadContext,
    SearchContent,
    DedupeStories,
    GenerateIdeas,
    StoreIdeas,
    AutoWrite,
}

impl ScoutStep {
    pub const ALL: [ScoutStep; 6] = [
        Self::LoadContext,
        Self::SearchContent,
        Self::DedupeStories,
        Self::GenerateIdeas,
        Self::StoreIdeas,
        Self::AutoWrite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadContext => "load-context",
            Self::SearchContent => "search-content",
            Self::DedupeStories => "dedupe-stories",
            Self::GenerateIdeas => "generate-ideas",
            Self::StoreIdeas => "store-ideas",
            Self::AutoWrite => "auto-write",
        }
    }
}

impl fmt::Display for ScoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a run that did not fail. Errors are reported separately, so a
/// quiet week never looks like an outage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoutRunResult {
    Completed(RunSummary),
    Skipped(SkipInfo),
}

impl ScoutRunResult {
    pub fn skipped(publication_id: Uuid, reason: SkipReason) -> Self {
        Self::Skipped(SkipInfo {
            publication_id,
            reason,
        })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(info) => Some(info.reason),
            Self::Completed(_) => None,
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub publication_id: Uuid,
    pub ideas_generated: usize,
    pub ideas_inserted: usize,
    pub idea_ids: Vec<Uuid>,
    pub auto_written: usize,
    /// `None` when the publication is in draft mode.
    pub auto_write: Option<AutoWriteOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipInfo {
    pub publication_id: Uuid,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoActiveTopics,
    NoNewStories,
    NoIdeasGenerated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveTopics => write!(f, "no active topics"),
            Self::NoNewStories => write!(f, "no new stories after dedup"),
            Self::NoIdeasGenerated => write!(f, "no ideas generated"),
        }
    }
}
