// In-memory test doubles for the scout engine.
//
// One mock per trait seam:
// - MockStore (ScoutStore)          publications, topics, ideas, completed sessions
// - MemorySearchCache (SearchCache) expiring HashMap
// - MockSearch (SearchProvider)     canned hits per lookup kind, optional failures
// - MockLlm (LanguageModel)         canned dedup/idea responses, optional failures
// - MockDrafting (DraftingAgent)    scripted draft polling, records every call
// - MockQueue (WorkQueue)           Vec-backed queue with manual redelivery
// - MemoryJournal (StepJournal)     run registry and step outputs
//
// Plus fixtures and a `Harness` that wires everything into `ScoutDeps`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use ai_client::AiError;
use scoutdesk_common::{
    AutoPublishMode, FilteredStory, Idea, IdeaBrief, IdeaSource, IdeaStatus, Publication, RecentIdea,
    Result, ScoutError, ScoutSchedule, SearchHit, Topic, TopicPriority, TopicResults,
};

use crate::infra::ids::idea_id;
use crate::pipeline::auto_write::AutoWriteConfig;
use crate::pipeline::context::ScoutContext;
use crate::pipeline::dedup;
use crate::traits::{
    CreateSession, Delivery, DraftSummary, DraftingAgent, LanguageModel, NewIdea, PendingRun,
    RunStatus, ScoutMessage, ScoutStore, ScoutTrigger, SearchCache, SearchKind, SearchProvider,
    StepJournal, WorkQueue,
};
use crate::workflows::{ScoutDeps, WorkflowPolicies};

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    publications: BTreeMap<Uuid, Publication>,
    topics: Vec<Topic>,
    ideas: Vec<Idea>,
    completed_sessions: Vec<(Uuid, DateTime<Utc>)>,
}

/// Stateful in-memory store. Builder pattern: `.with_publication()`,
/// `.with_topic()`, `.with_idea_at()`, `.with_completed_sessions()`.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<StoreState>,
    insert_failures: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publication(self, publication: Publication) -> Self {
        self.lock().publications.insert(publication.id, publication);
        self
    }

    pub fn with_topic(self, topic: Topic) -> Self {
        self.lock().topics.push(topic);
        self
    }

    pub fn with_idea_at(self, publication_id: Uuid, title: &str, angle: &str, created_at: DateTime<Utc>) -> Self {
        self.lock().ideas.push(Idea {
            id: idea_id(publication_id, title, angle),
            publication_id,
            topic_id: None,
            title: title.to_string(),
            angle: angle.to_string(),
            summary: String::new(),
            sources: Vec::new(),
            relevance_score: 0.5,
            status: IdeaStatus::New,
            session_id: None,
            created_at,
            updated_at: created_at,
        });
        self
    }

    /// An idea an earlier run already wrote up.
    pub fn with_promoted_idea(self, publication_id: Uuid, title: &str, angle: &str, session_id: &str) -> Self {
        let id = idea_id(publication_id, title, angle);
        let this = self.with_idea_at(publication_id, title, angle, Utc::now());
        if let Some(idea) = this.lock().ideas.iter_mut().find(|i| i.id == id) {
            idea.status = IdeaStatus::Promoted;
            idea.session_id = Some(session_id.to_string());
        }
        this
    }

    pub fn with_completed_sessions(self, publication_id: Uuid, count: usize, updated_at: DateTime<Utc>) -> Self {
        self.lock()
            .completed_sessions
            .extend(std::iter::repeat((publication_id, updated_at)).take(count));
        self
    }

    /// The next `count` idea inserts fail with a transient storage error.
    pub fn failing_inserts(self, count: u32) -> Self {
        self.insert_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn ideas(&self) -> Vec<Idea> {
        self.lock().ideas.clone()
    }

    pub fn idea_row(&self, id: Uuid) -> Option<Idea> {
        self.lock().ideas.iter().find(|i| i.id == id).cloned()
    }

    pub fn publication_row(&self, id: Uuid) -> Option<Publication> {
        self.lock().publications.get(&id).cloned()
    }

    pub fn next_scout_at(&self, id: Uuid) -> Option<i64> {
        self.lock().publications.get(&id).and_then(|p| p.next_scout_at)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ScoutStore for MockStore {
    async fn load_context(
        &self,
        publication_id: Uuid,
        ideas_since: DateTime<Utc>,
    ) -> Result<Option<ScoutContext>> {
        let state = self.lock();
        let Some(publication) = state.publications.get(&publication_id).cloned() else {
            return Ok(None);
        };
        let topics = state
            .topics
            .iter()
            .filter(|t| t.publication_id == publication_id && t.active)
            .cloned()
            .collect();
        let recent_ideas = state
            .ideas
            .iter()
            .filter(|i| i.publication_id == publication_id && i.created_at >= ideas_since)
            .map(|i| RecentIdea {
                id: i.id,
                title: i.title.clone(),
                angle: i.angle.clone(),
            })
            .collect();
        Ok(Some(ScoutContext {
            publication,
            topics,
            recent_ideas,
        }))
    }

    async fn publication(&self, publication_id: Uuid) -> Result<Option<Publication>> {
        Ok(self.publication_row(publication_id))
    }

    async fn publications_missing_schedule(&self) -> Result<Vec<Publication>> {
        Ok(self
            .lock()
            .publications
            .values()
            .filter(|p| p.next_scout_at.is_none())
            .cloned()
            .collect())
    }

    async fn due_publications(&self, now: i64) -> Result<Vec<Publication>> {
        Ok(self
            .lock()
            .publications
            .values()
            .filter(|p| p.next_scout_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }

    async fn set_next_scout_at(&self, publication_id: Uuid, next_scout_at: i64) -> Result<()> {
        match self.lock().publications.get_mut(&publication_id) {
            Some(p) => {
                p.next_scout_at = Some(next_scout_at);
                Ok(())
            }
            None => Err(ScoutError::NotFound(format!("publication {publication_id}"))),
        }
    }

    async fn update_schedule(
        &self,
        publication_id: Uuid,
        schedule: &ScoutSchedule,
        timezone: &str,
        next_scout_at: Option<i64>,
    ) -> Result<()> {
        match self.lock().publications.get_mut(&publication_id) {
            Some(p) => {
                p.scout_schedule = *schedule;
                p.timezone = timezone.to_string();
                if next_scout_at.is_some() {
                    p.next_scout_at = next_scout_at;
                }
                Ok(())
            }
            None => Err(ScoutError::NotFound(format!("publication {publication_id}"))),
        }
    }

    async fn publication_ids_page(&self, after: Option<Uuid>, limit: u32) -> Result<Vec<Uuid>> {
        Ok(self
            .lock()
            .publications
            .keys()
            .filter(|id| after.map_or(true, |a| **id > a))
            .take(limit as usize)
            .copied()
            .collect())
    }

    async fn insert_idea_if_absent(&self, idea: &NewIdea) -> Result<bool> {
        let remaining = self.insert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.insert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ScoutError::TransientStorage("database is locked".into()));
        }

        let mut state = self.lock();
        if state.ideas.iter().any(|i| i.id == idea.id) {
            return Ok(false);
        }
        let now = Utc::now();
        state.ideas.push(Idea {
            id: idea.id,
            publication_id: idea.publication_id,
            topic_id: idea.topic_id,
            title: idea.title.clone(),
            angle: idea.angle.clone(),
            summary: idea.summary.clone(),
            sources: idea.sources.clone(),
            relevance_score: idea.relevance_score,
            status: IdeaStatus::New,
            session_id: None,
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    async fn idea(&self, idea_id: Uuid) -> Result<Option<Idea>> {
        Ok(self.idea_row(idea_id))
    }

    async fn mark_idea_promoted(&self, idea_id: Uuid, session_id: &str) -> Result<()> {
        let mut state = self.lock();
        let idea = state
            .ideas
            .iter_mut()
            .find(|i| i.id == idea_id)
            .ok_or_else(|| ScoutError::NotFound(format!("idea {idea_id}")))?;
        idea.status = IdeaStatus::Promoted;
        idea.session_id = Some(session_id.to_string());
        idea.updated_at = Utc::now();
        Ok(())
    }

    async fn completed_sessions_since(&self, publication_id: Uuid, since: DateTime<Utc>) -> Result<u32> {
        let count = self
            .lock()
            .completed_sessions
            .iter()
            .filter(|(p, at)| *p == publication_id && *at >= since)
            .count();
        Ok(count as u32)
    }
}

// ---------------------------------------------------------------------------
// MemorySearchCache
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySearchCache {
    entries: Mutex<HashMap<String, (Vec<SearchHit>, DateTime<Utc>)>>,
}

impl MemorySearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchCache for MemorySearchCache {
    async fn get(&self, cache_key: &str, now: DateTime<Utc>) -> Result<Option<Vec<SearchHit>>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(cache_key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(hits, _)| hits.clone()))
    }

    async fn put(
        &self,
        cache_key: &str,
        _kind: SearchKind,
        _query: &str,
        hits: &[SearchHit],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(cache_key.to_string(), (hits.to_vec(), expires_at));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockSearch
// ---------------------------------------------------------------------------

/// Returns the hits registered for a kind, else the default hits.
#[derive(Default)]
pub struct MockSearch {
    by_kind: HashMap<SearchKind, Vec<SearchHit>>,
    default_hits: Vec<SearchHit>,
    failing: HashSet<SearchKind>,
    calls: AtomicU32,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_hits(mut self, hits: Vec<SearchHit>) -> Self {
        self.default_hits = hits;
        self
    }

    pub fn with_hits(mut self, kind: SearchKind, hits: Vec<SearchHit>) -> Self {
        self.by_kind.insert(kind, hits);
        self
    }

    pub fn failing_kind(mut self, kind: SearchKind) -> Self {
        self.failing.insert(kind);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(&self, kind: SearchKind, _query: &str) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&kind) {
            return Err(ScoutError::UpstreamUnavailable(format!("{} search down", kind.as_str())));
        }
        Ok(self
            .by_kind
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| self.default_hits.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockLlm
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
}

/// Routes dedup prompts and idea prompts to separate canned replies.
pub struct MockLlm {
    dedup: Reply,
    ideas: Reply,
    idea_failures: AtomicU32,
    dedup_calls: AtomicU32,
    idea_calls: AtomicU32,
}

impl MockLlm {
    /// Keeps every story and generates no ideas until told otherwise.
    pub fn new() -> Self {
        Self {
            dedup: Reply::Text(r#"{"decisions": []}"#.to_string()),
            ideas: Reply::Text("[]".to_string()),
            idea_failures: AtomicU32::new(0),
            dedup_calls: AtomicU32::new(0),
            idea_calls: AtomicU32::new(0),
        }
    }

    pub fn on_dedup(mut self, response: &str) -> Self {
        self.dedup = Reply::Text(response.to_string());
        self
    }

    pub fn failing_dedup(mut self) -> Self {
        self.dedup = Reply::Fail;
        self
    }

    pub fn on_ideas(mut self, response: &str) -> Self {
        self.ideas = Reply::Text(response.to_string());
        self
    }

    pub fn failing_ideas(mut self) -> Self {
        self.ideas = Reply::Fail;
        self
    }

    /// The next `count` idea calls fail before the canned reply is used.
    pub fn flaky_ideas(self, count: u32) -> Self {
        self.idea_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn dedup_calls(&self) -> u32 {
        self.dedup_calls.load(Ordering::SeqCst)
    }

    pub fn idea_calls(&self) -> u32 {
        self.idea_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

fn outage() -> AiError {
    AiError::Api {
        status: 503,
        body: "mock outage".to_string(),
    }
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn complete(&self, system: &str, _user: &str) -> ai_client::error::Result<String> {
        let reply = if system == dedup::SYSTEM_PROMPT {
            self.dedup_calls.fetch_add(1, Ordering::SeqCst);
            self.dedup.clone()
        } else {
            self.idea_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.idea_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.idea_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(outage());
            }
            self.ideas.clone()
        };

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(outage()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

// ---------------------------------------------------------------------------
// MockDrafting
// ---------------------------------------------------------------------------

/// What `list_drafts` reports over successive polls.
#[derive(Debug, Clone, Copy)]
pub enum DraftScript {
    /// A final draft on the first poll.
    FinalImmediately,
    /// Non-final drafts until poll `n`, then a final one.
    FinalAfter(u32),
    /// Only non-final drafts, ever.
    NonFinalOnly,
    /// No drafts at all.
    Never,
}

#[derive(Default)]
struct DraftingState {
    sessions: Vec<CreateSession>,
    messages: Vec<(String, String)>,
    published: Vec<(String, String, String)>,
    polls: u32,
}

pub struct MockDrafting {
    script: DraftScript,
    fail_create: AtomicBool,
    fail_publish: AtomicBool,
    state: Mutex<DraftingState>,
}

impl MockDrafting {
    pub fn new() -> Self {
        Self::scripted(DraftScript::FinalImmediately)
    }

    pub fn scripted(script: DraftScript) -> Self {
        Self {
            script,
            fail_create: AtomicBool::new(false),
            fail_publish: AtomicBool::new(false),
            state: Mutex::new(DraftingState::default()),
        }
    }

    pub fn failing_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    /// Publish is rejected with an upstream error.
    pub fn failing_publish(self) -> Self {
        self.fail_publish.store(true, Ordering::SeqCst);
        self
    }

    pub fn sessions(&self) -> Vec<CreateSession> {
        self.state.lock().unwrap().sessions.clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().messages.clone()
    }

    /// `(session_id, slug, author)` per publish call.
    pub fn published(&self) -> Vec<(String, String, String)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state.lock().unwrap().polls
    }

    /// Every remote call of any kind.
    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.sessions.len() + state.messages.len() + state.published.len() + state.polls as usize
    }
}

impl Default for MockDrafting {
    fn default() -> Self {
        Self::new()
    }
}

fn draft(version: u32, is_final: bool) -> DraftSummary {
    DraftSummary { version, is_final }
}

#[async_trait]
impl DraftingAgent for MockDrafting {
    async fn create_session(&self, request: &CreateSession) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ScoutError::UpstreamUnavailable("drafting agent down".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.sessions.push(request.clone());
        Ok(format!("session-{}", state.sessions.len()))
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .messages
            .push((session_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn list_drafts(&self, _session_id: &str) -> Result<Vec<DraftSummary>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        let drafts = match self.script {
            DraftScript::FinalImmediately => vec![draft(1, true)],
            DraftScript::FinalAfter(n) if state.polls >= n => vec![draft(1, false), draft(2, true)],
            DraftScript::FinalAfter(_) => vec![draft(1, false)],
            DraftScript::NonFinalOnly => vec![draft(1, false), draft(2, false)],
            DraftScript::Never => vec![],
        };
        Ok(drafts)
    }

    async fn publish(&self, session_id: &str, slug: &str, author: &str) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ScoutError::UpstreamUnavailable("publish rejected".into()));
        }
        self.state.lock().unwrap().published.push((
            session_id.to_string(),
            slug.to_string(),
            author.to_string(),
        ));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockQueue
// ---------------------------------------------------------------------------

struct QueuedMessage {
    id: Uuid,
    message: ScoutMessage,
    visible: bool,
    attempts: u32,
}

/// Claimed messages stay invisible until acked or `redeliver_unacked()`.
#[derive(Default)]
pub struct MockQueue {
    messages: Mutex<Vec<QueuedMessage>>,
    acked: Mutex<Vec<Uuid>>,
    fail_enqueue: AtomicBool,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the process dying between schedule advance and enqueue.
    pub fn set_failing_enqueue(&self, failing: bool) {
        self.fail_enqueue.store(failing, Ordering::SeqCst);
    }

    /// Every unacked message, claimed or not.
    pub fn pending(&self) -> Vec<ScoutMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.message.clone())
            .collect()
    }

    pub fn acked(&self) -> Vec<Uuid> {
        self.acked.lock().unwrap().clone()
    }

    /// Make claimed-but-unacked messages visible again, as if their visibility
    /// timeout lapsed.
    pub fn redeliver_unacked(&self) {
        for m in self.messages.lock().unwrap().iter_mut() {
            m.visible = true;
        }
    }

    fn push(&self, message: &ScoutMessage) -> Uuid {
        let id = Uuid::new_v4();
        self.messages.lock().unwrap().push(QueuedMessage {
            id,
            message: message.clone(),
            visible: true,
            attempts: 0,
        });
        id
    }
}

#[async_trait]
impl WorkQueue for MockQueue {
    async fn enqueue(&self, message: &ScoutMessage) -> Result<Uuid> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(ScoutError::UpstreamUnavailable("queue unavailable".into()));
        }
        Ok(self.push(message))
    }

    async fn enqueue_batch(&self, messages: &[ScoutMessage]) -> Result<usize> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(ScoutError::UpstreamUnavailable("queue unavailable".into()));
        }
        for message in messages {
            self.push(message);
        }
        Ok(messages.len())
    }

    async fn receive(&self, max: u32, _visibility: Duration) -> Result<Vec<Delivery>> {
        let mut messages = self.messages.lock().unwrap();
        Ok(messages
            .iter_mut()
            .filter(|m| m.visible)
            .take(max as usize)
            .map(|m| {
                m.visible = false;
                m.attempts += 1;
                Delivery {
                    id: m.id,
                    message: m.message.clone(),
                    attempts: m.attempts,
                }
            })
            .collect())
    }

    async fn ack(&self, delivery_id: Uuid) -> Result<()> {
        self.messages.lock().unwrap().retain(|m| m.id != delivery_id);
        self.acked.lock().unwrap().push(delivery_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryJournal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub publication_id: Uuid,
    pub trigger: ScoutTrigger,
    pub status: RunStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub heartbeat: DateTime<Utc>,
}

#[derive(Default)]
struct JournalState {
    runs: HashMap<Uuid, RunRecord>,
    steps: HashMap<(Uuid, String), serde_json::Value>,
}

#[derive(Default)]
pub struct MemoryJournal {
    state: Mutex<JournalState>,
    refuse_starts_for: Mutex<HashSet<Uuid>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// `start_run` fails for this publication.
    pub fn failing_start_for(&self, publication_id: Uuid) {
        self.refuse_starts_for.lock().unwrap().insert(publication_id);
    }

    /// A run left `running` with the given heartbeat, as after a crash.
    pub fn with_running_run(&self, run_id: Uuid, publication_id: Uuid, heartbeat: DateTime<Utc>) {
        self.state.lock().unwrap().runs.insert(
            run_id,
            RunRecord {
                publication_id,
                trigger: ScoutTrigger::Cron,
                status: RunStatus::Running,
                result: None,
                error: None,
                heartbeat,
            },
        );
    }

    pub fn with_saved_step(&self, run_id: Uuid, step: &str, output: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .steps
            .insert((run_id, step.to_string()), output);
    }

    pub fn saved_step(&self, run_id: Uuid, step: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .steps
            .get(&(run_id, step.to_string()))
            .cloned()
    }

    pub fn run(&self, run_id: Uuid) -> Option<RunRecord> {
        self.state.lock().unwrap().runs.get(&run_id).cloned()
    }

    pub fn run_ids(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().runs.keys().copied().collect()
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().unwrap().runs.len()
    }
}

#[async_trait]
impl StepJournal for MemoryJournal {
    async fn start_run(&self, run_id: Uuid, publication_id: Uuid, trigger: ScoutTrigger) -> Result<()> {
        if self.refuse_starts_for.lock().unwrap().contains(&publication_id) {
            return Err(ScoutError::Database("run registry unavailable".into()));
        }
        let mut state = self.state.lock().unwrap();
        let record = state.runs.entry(run_id).or_insert_with(|| RunRecord {
            publication_id,
            trigger,
            status: RunStatus::Running,
            result: None,
            error: None,
            heartbeat: Utc::now(),
        });
        record.heartbeat = Utc::now();
        Ok(())
    }

    async fn load_step(&self, run_id: Uuid, step: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.saved_step(run_id, step))
    }

    async fn save_step(&self, run_id: Uuid, step: &str, output: &serde_json::Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.steps.insert((run_id, step.to_string()), output.clone());
        if let Some(run) = state.runs.get_mut(&run_id) {
            run.heartbeat = Utc::now();
        }
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        result: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<()> {
        if let Some(run) = self.state.lock().unwrap().runs.get_mut(&run_id) {
            run.status = status;
            run.result = result.cloned();
            run.error = error.map(str::to_string);
            run.heartbeat = Utc::now();
        }
        Ok(())
    }

    async fn incomplete_runs(&self, stale_before: DateTime<Utc>) -> Result<Vec<PendingRun>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|(_, r)| r.status == RunStatus::Running && r.heartbeat < stale_before)
            .map(|(id, r)| PendingRun {
                run_id: *id,
                publication_id: r.publication_id,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// All mocks plus `ScoutDeps` wired to them, with no retry delays and a
/// millisecond draft poll.
pub struct Harness {
    pub store: Arc<MockStore>,
    pub queue: Arc<MockQueue>,
    pub journal: Arc<MemoryJournal>,
    pub search: Arc<MockSearch>,
    pub cache: Arc<MemorySearchCache>,
    pub llm: Arc<MockLlm>,
    pub drafting: Arc<MockDrafting>,
}

impl Harness {
    pub fn new(store: MockStore, search: MockSearch, llm: MockLlm, drafting: MockDrafting) -> Self {
        Self {
            store: Arc::new(store),
            queue: Arc::new(MockQueue::new()),
            journal: Arc::new(MemoryJournal::new()),
            search: Arc::new(search),
            cache: Arc::new(MemorySearchCache::new()),
            llm: Arc::new(llm),
            drafting: Arc::new(drafting),
        }
    }

    pub fn deps(&self) -> ScoutDeps {
        ScoutDeps::builder()
            .store(self.store.clone())
            .queue(self.queue.clone())
            .journal(self.journal.clone())
            .search(self.search.clone())
            .search_cache(self.cache.clone())
            .llm(self.llm.clone())
            .drafting(self.drafting.clone())
            .policies(WorkflowPolicies::default().without_delays())
            .auto_write(AutoWriteConfig {
                poll_interval: Duration::from_millis(1),
                max_poll_attempts: 3,
            })
            .build()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn publication(mode: AutoPublishMode) -> Publication {
    Publication {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: "Tooling Weekly".to_string(),
        description: Some("Practical notes on developer tooling".to_string()),
        auto_publish_mode: mode,
        cadence_posts_per_week: 3,
        scout_schedule: ScoutSchedule::default(),
        timezone: "UTC".to_string(),
        next_scout_at: None,
    }
}

pub fn topic(publication_id: Uuid, name: &str, priority: TopicPriority) -> Topic {
    Topic {
        id: Uuid::new_v4(),
        publication_id,
        name: name.to_string(),
        description: None,
        priority,
        active: true,
    }
}

/// `count` hits titled "`prefix` 1", "`prefix` 2", ...
pub fn search_hits(prefix: &str, count: usize) -> Vec<SearchHit> {
    (1..=count)
        .map(|i| SearchHit {
            title: format!("{prefix} {i}"),
            url: format!("https://news.example.com/{}/{i}", prefix.replace(' ', "-")),
            snippet: format!("Snippet for {prefix} {i}"),
            date: None,
        })
        .collect()
}

pub fn topic_results(topic_name: &str, news: Vec<SearchHit>) -> TopicResults {
    TopicResults {
        topic_name: topic_name.to_string(),
        topic_description: None,
        priority: TopicPriority::Normal,
        news,
        web: Vec::new(),
    }
}

pub fn story(topic: &str, title: &str) -> FilteredStory {
    FilteredStory {
        title: title.to_string(),
        snippet: format!("About {title}"),
        url: format!("https://news.example.com/{}", title.replace(' ', "-")),
        date: None,
        topic: topic.to_string(),
    }
}

/// Brief with angle "`title` angle" and one source.
pub fn brief(title: &str, topic: &str, relevance_score: f64) -> IdeaBrief {
    IdeaBrief {
        title: title.to_string(),
        angle: format!("{title} angle"),
        summary: format!("Why {title} matters now"),
        topic: topic.to_string(),
        relevance_score,
        sources: vec![IdeaSource {
            url: format!("https://news.example.com/{}", title.replace(' ', "-")),
            title: title.to_string(),
            snippet: String::new(),
        }],
    }
}

/// The stored row a brief becomes, as the idea store would write it.
pub fn idea_from_brief(publication_id: Uuid, brief: &IdeaBrief) -> Idea {
    let now = Utc::now();
    Idea {
        id: idea_id(publication_id, &brief.title, &brief.angle),
        publication_id,
        topic_id: None,
        title: brief.title.clone(),
        angle: brief.angle.clone(),
        summary: brief.summary.clone(),
        sources: brief.sources.clone(),
        relevance_score: brief.relevance_score,
        status: IdeaStatus::New,
        session_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// LLM idea response (bare JSON array) for the given briefs.
pub fn ideas_json(briefs: &[IdeaBrief]) -> String {
    serde_json::to_string(briefs).unwrap()
}
