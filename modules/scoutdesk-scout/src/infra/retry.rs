//! Bounded exponential-backoff retry for storage operations.
//!
//! The store can reject concurrent writers outright. Short local retries turn
//! that class of race into success without surfacing an error. Only wrap
//! idempotent or single-statement operations.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use scoutdesk_common::{Result, ScoutError};

/// Postgres SQLSTATEs that mean "try again".
const TRANSIENT_SQLSTATES: &[&str] = &[
    "40001", // serialization_failure
    "40P01", // deadlock_detected
    "55P03", // lock_not_available
    "53300", // too_many_connections
    "57P03", // cannot_connect_now
];

const TRANSIENT_SIGNATURES: &[&str] = &[
    "busy",
    "locked",
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "try again",
];

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based): base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Run `op` with the default policy (3 retries, 100ms base).
pub async fn with_retry<T, F, Fut>(op_name: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_config(&RetryConfig::default(), op_name, op).await
}

pub async fn with_retry_config<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(op = op_name, retries = attempt, "Storage operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient_storage() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient storage error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classify a sqlx error into the storage half of the error taxonomy.
pub fn storage_error(e: sqlx::Error) -> ScoutError {
    let transient = match &e {
        sqlx::Error::Database(db) => {
            db.code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref()))
                || is_transient_message(db.message())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        other => is_transient_message(&other.to_string()),
    };

    if transient {
        ScoutError::TransientStorage(e.to_string())
    } else {
        ScoutError::Database(e.to_string())
    }
}

/// Lock-contention and transient-infrastructure signatures in an error message.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn backoff_doubles() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(0), Duration::from_millis(100));
        assert_eq!(config.delay_for(1), Duration::from_millis(200));
        assert_eq!(config.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn message_signatures() {
        assert!(is_transient_message("database is locked"));
        assert!(is_transient_message("SQLITE_BUSY: database busy"));
        assert!(is_transient_message("pool timed out while waiting for an open connection"));
        assert!(!is_transient_message("duplicate key value violates unique constraint"));
    }

    #[test]
    fn pool_timeout_is_transient() {
        assert!(storage_error(sqlx::Error::PoolTimedOut).is_transient_storage());
        assert!(!storage_error(sqlx::Error::RowNotFound).is_transient_storage());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry_config(&fast(), "insert", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ScoutError::TransientStorage("database is locked".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_propagate_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry_config(&fast(), "insert", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ScoutError::Database("syntax error".into()))
        })
        .await;

        assert!(matches!(result, Err(ScoutError::Database(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry_config(&fast(), "insert", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ScoutError::TransientStorage("busy".into()))
        })
        .await;

        assert!(matches!(result, Err(ScoutError::TransientStorage(_))));
        // One initial attempt plus three retries.
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
