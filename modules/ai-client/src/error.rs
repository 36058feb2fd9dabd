use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("LLM provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM provider error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("LLM provider returned no text content")]
    EmptyResponse,

    #[error("{0} environment variable not set")]
    MissingKey(&'static str),

    #[error("Invalid request header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}
