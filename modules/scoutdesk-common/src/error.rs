use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    /// Publication or idea missing. Terminal for the run.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock contention or a transient infrastructure signature from the store.
    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    #[error("Database error: {0}")]
    Database(String),

    /// Search, LLM or drafting-agent network failure or non-2xx response.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The LLM produced nothing usable. Terminal but benign.
    #[error("Nothing usable produced: {0}")]
    ValidationEmpty(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// The drafting agent produced no draft within the poll window.
    #[error("No draft produced: {0}")]
    DraftTimeout(String),

    /// A drafting session was opened but the idea could not be carried
    /// through to publish. Another attempt would open a second session.
    #[error("Drafting session {session_id} abandoned: {reason}")]
    SessionAbandoned { session_id: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScoutError {
    /// Errors that another attempt cannot fix. The workflow runner fails the
    /// step immediately instead of spending its retry budget on them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::ValidationEmpty(_)
                | Self::DraftTimeout(_)
                | Self::SessionAbandoned { .. }
                | Self::Config(_)
                | Self::Serialization(_)
        )
    }

    pub fn is_transient_storage(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }
}
