//! Journaled step execution with per-step retry and timeout.
//!
//! A step whose output is already in the journal is replayed instead of run,
//! which is how a crashed run resumes at its first incomplete step. Step
//! outputs are the only thing carried between steps.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use scoutdesk_common::{Result, ScoutError};

use super::types::ScoutStep;
use crate::infra::retry::with_retry;
use crate::traits::StepJournal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub timeout: Option<Duration>,
}

impl StepPolicy {
    /// Single attempt, no timeout. For steps that retry storage internally.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            timeout: None,
        }
    }

    pub const fn exponential(max_retries: u32, base: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            delay: base,
            backoff: Backoff::Exponential,
            timeout: Some(timeout),
        }
    }

    pub const fn fixed(max_retries: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            max_retries,
            delay,
            backoff: Backoff::Fixed,
            timeout: Some(timeout),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => self.delay.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

/// Retry and timeout policy for every step of a scout run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowPolicies {
    pub load_context: StepPolicy,
    pub search: StepPolicy,
    pub dedup: StepPolicy,
    pub generate: StepPolicy,
    pub store: StepPolicy,
    pub auto_write: StepPolicy,
}

impl Default for WorkflowPolicies {
    fn default() -> Self {
        Self {
            load_context: StepPolicy::none(),
            search: StepPolicy::exponential(2, Duration::from_secs(10), Duration::from_secs(120)),
            dedup: StepPolicy::exponential(2, Duration::from_secs(5), Duration::from_secs(60)),
            generate: StepPolicy::exponential(2, Duration::from_secs(5), Duration::from_secs(120)),
            store: StepPolicy::none(),
            auto_write: StepPolicy::fixed(1, Duration::from_secs(10), Duration::from_secs(600)),
        }
    }
}

impl WorkflowPolicies {
    pub fn for_step(&self, step: ScoutStep) -> StepPolicy {
        match step {
            ScoutStep::LoadContext => self.load_context,
            ScoutStep::SearchContent => self.search,
            ScoutStep::DedupeStories => self.dedup,
            ScoutStep::GenerateIdeas => self.generate,
            ScoutStep::StoreIdeas => self.store,
            ScoutStep::AutoWrite => self.auto_write,
        }
    }

    /// Same retry budgets and timeouts with no waiting between attempts.
    pub fn without_delays(mut self) -> Self {
        for policy in [
            &mut self.load_context,
            &mut self.search,
            &mut self.dedup,
            &mut self.generate,
            &mut self.store,
            &mut self.auto_write,
        ] {
            policy.delay = Duration::ZERO;
        }
        self
    }
}

pub struct StepRunner<'a> {
    journal: &'a dyn StepJournal,
    run_id: Uuid,
}

impl<'a> StepRunner<'a> {
    pub fn new(journal: &'a dyn StepJournal, run_id: Uuid) -> Self {
        Self { journal, run_id }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Replay `step` from the journal, or run it under `policy` and journal
    /// its output. Terminal errors are not retried.
    pub async fn run<T, F, Fut>(&self, step: ScoutStep, policy: StepPolicy, mut op: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let run_id = self.run_id;

        let saved = with_retry("load_step", || self.journal.load_step(run_id, step.as_str())).await?;
        if let Some(saved) = saved {
            match serde_json::from_value(saved) {
                Ok(value) => {
                    info!(%run_id, %step, "Step replayed from journal");
                    return Ok(value);
                }
                Err(e) => warn!(%run_id, %step, error = %e, "Journaled output unreadable, re-running step"),
            }
        }

        let mut attempt = 0u32;
        let value = loop {
            debug!(%run_id, %step, attempt = attempt + 1, "Step started");

            let outcome = match policy.timeout {
                Some(limit) => match tokio::time::timeout(limit, op()).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ScoutError::Timeout(format!(
                        "step {step} exceeded {}s",
                        limit.as_secs()
                    ))),
                },
                None => op().await,
            };

            match outcome {
                Ok(value) => break value,
                Err(e) if !e.is_terminal() && attempt < policy.max_retries => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        %run_id,
                        %step,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(%run_id, %step, attempts = attempt + 1, error = %e, "Step failed");
                    return Err(e);
                }
            }
        };

        let output = serde_json::to_value(&value)?;
        with_retry("save_step", || self.journal.save_step(run_id, step.as_str(), &output)).await?;
        info!(%run_id, %step, attempts = attempt + 1, "Step completed");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::testing::MemoryJournal;

    fn quick(max_retries: u32) -> StepPolicy {
        StepPolicy::exponential(max_retries, Duration::ZERO, Duration::from_secs(5))
    }

    #[test]
    fn default_policies_match_step_table() {
        let p = WorkflowPolicies::default();
        assert_eq!(p.search.max_retries, 2);
        assert_eq!(p.search.timeout, Some(Duration::from_secs(120)));
        assert_eq!(p.dedup.timeout, Some(Duration::from_secs(60)));
        assert_eq!(p.auto_write.delay_for(0), Duration::from_secs(10));
        assert_eq!(p.auto_write.delay_for(3), Duration::from_secs(10));
        assert_eq!(p.generate.delay_for(1), Duration::from_secs(10));
        assert_eq!(p.load_context.timeout, None);
    }

    #[tokio::test]
    async fn completed_steps_are_replayed_not_rerun() {
        let journal = MemoryJournal::new();
        let run_id = Uuid::new_v4();
        journal.with_saved_step(run_id, ScoutStep::SearchContent.as_str(), json!([1, 2, 3]));

        let runner = StepRunner::new(&journal, run_id);
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let value: Vec<u32> = runner
            .run(ScoutStep::SearchContent, quick(0), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![9])
            })
            .await
            .unwrap();

        assert_eq!(value, vec![1, 2, 3]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retriable_errors_use_the_retry_budget() {
        let journal = MemoryJournal::new();
        let run_id = Uuid::new_v4();
        let runner = StepRunner::new(&journal, run_id);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let value: u32 = runner
            .run(ScoutStep::GenerateIdeas, quick(2), move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(ScoutError::UpstreamUnavailable("503".into())),
                    n => Ok(n),
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(journal.saved_step(run_id, "generate-ideas"), Some(json!(2)));
    }

    #[tokio::test]
    async fn terminal_errors_fail_immediately() {
        let journal = MemoryJournal::new();
        let runner = StepRunner::new(&journal, Uuid::new_v4());
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner
            .run::<u32, _, _>(ScoutStep::LoadContext, quick(2), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ScoutError::NotFound("publication".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ScoutError::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeouts_count_as_retriable_failures() {
        let journal = MemoryJournal::new();
        let runner = StepRunner::new(&journal, Uuid::new_v4());
        let policy = StepPolicy::fixed(1, Duration::ZERO, Duration::from_millis(20));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let err = runner
            .run::<u32, _, _>(ScoutStep::AutoWrite, policy, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ScoutError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one attempt plus one retry");
    }
}
