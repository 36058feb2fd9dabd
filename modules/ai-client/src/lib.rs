//! Provider client for single-turn LLM completions.
//!
//! Callers depend on the [`LanguageModel`] trait; [`Claude`] is the production
//! implementation backed by the Anthropic Messages API.

pub mod claude;
pub mod error;
pub mod traits;
pub mod util;

pub use claude::Claude;
pub use error::AiError;
pub use traits::LanguageModel;
