use async_trait::async_trait;

use crate::error::Result;

/// Single-turn completion: one system prompt, one user message, text back.
///
/// No tool use at this layer. Implementations apply their own request timeout;
/// retry policy belongs to the caller.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str;
}
