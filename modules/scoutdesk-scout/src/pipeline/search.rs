//! Per-topic research fan-out across the news and web providers.
//!
//! Each lookup goes through a 24h cache keyed by the normalized query. A failed
//! provider call degrades to an empty result for that topic/provider; only a
//! run where every call failed is reported as an upstream outage, so the step
//! retry can deal with it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use scoutdesk_common::{Result, ScoutError, SearchHit, Topic, TopicResults};

use crate::infra::util::{content_hash, normalize_query};
use crate::traits::{SearchCache, SearchKind, SearchProvider};

pub const CACHE_TTL_HOURS: i64 = 24;

pub struct SearchAggregator {
    provider: Arc<dyn SearchProvider>,
    cache: Arc<dyn SearchCache>,
    ttl: Duration,
}

/// Counts per run, for the completion log line.
#[derive(Default)]
struct LookupStats {
    calls: AtomicUsize,
    failures: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl SearchAggregator {
    pub fn new(provider: Arc<dyn SearchProvider>, cache: Arc<dyn SearchCache>) -> Self {
        Self {
            provider,
            cache,
            ttl: Duration::hours(CACHE_TTL_HOURS),
        }
    }

    /// One aggregated result set per topic, in topic order.
    pub async fn search_topics(&self, topics: &[Topic], now: DateTime<Utc>) -> Result<Vec<TopicResults>> {
        let stats = LookupStats::default();

        let results = join_all(topics.iter().map(|topic| self.search_topic(topic, now, &stats))).await;

        let calls = stats.calls.load(Ordering::Relaxed);
        let failures = stats.failures.load(Ordering::Relaxed);
        let stories: usize = results.iter().map(TopicResults::story_count).sum();
        info!(
            topics = topics.len(),
            stories,
            provider_calls = calls,
            provider_failures = failures,
            cache_hits = stats.cache_hits.load(Ordering::Relaxed),
            "Search complete"
        );

        if calls > 0 && failures == calls {
            return Err(ScoutError::UpstreamUnavailable(format!(
                "all {calls} search lookups failed"
            )));
        }
        Ok(results)
    }

    async fn search_topic(&self, topic: &Topic, now: DateTime<Utc>, stats: &LookupStats) -> TopicResults {
        let query = build_query(topic);
        let (news, web) = tokio::join!(
            self.cached_search(SearchKind::News, &query, now, stats),
            self.cached_search(SearchKind::Web, &query, now, stats),
        );

        TopicResults {
            topic_name: topic.name.clone(),
            topic_description: topic.description.clone(),
            priority: topic.priority,
            news,
            web,
        }
    }

    async fn cached_search(
        &self,
        kind: SearchKind,
        query: &str,
        now: DateTime<Utc>,
        stats: &LookupStats,
    ) -> Vec<SearchHit> {
        let key = cache_key(kind, query);

        match self.cache.get(&key, now).await {
            Ok(Some(hits)) => {
                debug!(kind = kind.as_str(), query, hits = hits.len(), "Search cache hit");
                stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return hits;
            }
            Ok(None) => {}
            Err(e) => warn!(kind = kind.as_str(), query, error = %e, "Search cache read failed"),
        }

        stats.calls.fetch_add(1, Ordering::Relaxed);
        match self.provider.search(kind, query).await {
            Ok(hits) => {
                if let Err(e) = self.cache.put(&key, kind, query, &hits, now + self.ttl).await {
                    warn!(kind = kind.as_str(), query, error = %e, "Search cache write failed");
                }
                hits
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(kind = kind.as_str(), query, error = %e, "Search lookup failed, using empty result");
                Vec::new()
            }
        }
    }
}

/// Topic name plus description, whitespace-tidied.
pub fn build_query(topic: &Topic) -> String {
    let mut query = topic.name.trim().to_string();
    if let Some(description) = topic.description.as_deref().map(str::trim) {
        if !description.is_empty() {
            query.push(' ');
            query.push_str(description);
        }
    }
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cache key: hash of the lookup kind and the normalized query.
pub fn cache_key(kind: SearchKind, query: &str) -> String {
    content_hash(&[kind.as_str(), &normalize_query(query)])
}
