use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Publication ---

/// How far a publication lets the pipeline go on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoPublishMode {
    /// Store ideas only.
    Draft,
    /// Write and publish the top idea every run.
    Publish,
    /// Write and publish the top idea, gated by the weekly cadence.
    FullAuto,
}

impl AutoPublishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Publish => "publish",
            Self::FullAuto => "full-auto",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "publish" => Some(Self::Publish),
            "full-auto" | "full_auto" => Some(Self::FullAuto),
            _ => None,
        }
    }
}

/// When a publication gets scouted, in its own local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoutSchedule {
    /// Once a day at `hour:00`.
    Daily { hour: u32 },
    /// `times` evenly spaced runs per day, the first at midnight.
    TimesPerDay { times: u32 },
    /// Every `days` days at `hour:00`.
    EveryNDays { days: u32, hour: u32 },
}

impl Default for ScoutSchedule {
    fn default() -> Self {
        Self::Daily { hour: 6 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub auto_publish_mode: AutoPublishMode,
    pub cadence_posts_per_week: u32,
    pub scout_schedule: ScoutSchedule,
    pub timezone: String,
    /// Epoch seconds of the next scheduled scout run.
    pub next_scout_at: Option<i64>,
}

// --- Topic ---

/// Ordered so that `Urgent > High > Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicPriority {
    Normal,
    High,
    Urgent,
}

impl TopicPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// Unknown values read as `Normal`.
    pub fn from_db(s: &str) -> Self {
        match s {
            "urgent" => Self::Urgent,
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub publication_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub priority: TopicPriority,
    pub active: bool,
}

// --- Search and stories ---

/// One result from a news or web lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    #[serde(default)]
    pub date: Option<String>,
}

/// Both lookups for one topic, with the topic carried along for later steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResults {
    pub topic_name: String,
    pub topic_description: Option<String>,
    pub priority: TopicPriority,
    pub news: Vec<SearchHit>,
    pub web: Vec<SearchHit>,
}

impl TopicResults {
    pub fn story_count(&self) -> usize {
        self.news.len() + self.web.len()
    }
}

/// A story that survived dedup. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredStory {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub date: Option<String>,
    pub topic: String,
}

// --- Ideas ---

/// Title and angle of an idea from the trailing dedup window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentIdea {
    pub id: Uuid,
    pub title: String,
    pub angle: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaSource {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// An LLM-proposed idea before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaBrief {
    pub title: String,
    pub angle: String,
    pub summary: String,
    pub topic: String,
    pub relevance_score: f64,
    pub sources: Vec<IdeaSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeaStatus {
    New,
    Reviewed,
    Promoted,
    Dismissed,
}

impl IdeaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Reviewed => "reviewed",
            Self::Promoted => "promoted",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "reviewed" => Some(Self::Reviewed),
            "promoted" => Some(Self::Promoted),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    /// Derived from publication id, title and angle.
    pub id: Uuid,
    pub publication_id: Uuid,
    pub topic_id: Option<Uuid>,
    pub title: String,
    pub angle: String,
    pub summary: String,
    pub sources: Vec<IdeaSource>,
    pub relevance_score: f64,
    pub status: IdeaStatus,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
