use std::env;
use std::str::FromStr;

use tracing::info;

use crate::error::{Result, ScoutError};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // LLM
    pub anthropic_api_key: String,
    pub llm_model: String,

    // Research provider
    pub search_api_key: String,
    pub search_base_url: String,

    // Drafting agent
    pub drafting_agent_url: String,
    pub drafting_agent_token: String,

    // Manual trigger surface
    pub scout_api_token: String,
    pub web_host: String,
    pub web_port: u16,

    // Scheduling and queue
    pub cron_interval_secs: u64,
    pub queue_poll_secs: u64,
    pub queue_batch_size: u32,
    pub queue_visibility_secs: u64,
    pub run_all_batch_size: u32,

    // Auto-write polling
    pub draft_poll_interval_secs: u64,
    pub draft_poll_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required_env("DATABASE_URL")?,
            anthropic_api_key: required_env("ANTHROPIC_API_KEY")?,
            llm_model: env_or("LLM_MODEL", "claude-sonnet-4-20250514"),
            search_api_key: required_env("SEARCH_API_KEY")?,
            search_base_url: env_or("SEARCH_BASE_URL", "https://google.serper.dev"),
            drafting_agent_url: required_env("DRAFTING_AGENT_URL")?,
            drafting_agent_token: env_or("DRAFTING_AGENT_TOKEN", ""),
            scout_api_token: required_env("SCOUT_API_TOKEN")?,
            web_host: env_or("WEB_HOST", "0.0.0.0"),
            web_port: parsed_env("WEB_PORT", 3000)?,
            cron_interval_secs: parsed_env("CRON_INTERVAL_SECS", 3600)?,
            queue_poll_secs: parsed_env("QUEUE_POLL_SECS", 5)?,
            queue_batch_size: parsed_env("QUEUE_BATCH_SIZE", 10)?,
            queue_visibility_secs: parsed_env("QUEUE_VISIBILITY_SECS", 300)?,
            run_all_batch_size: parsed_env("RUN_ALL_BATCH_SIZE", 50)?,
            draft_poll_interval_secs: parsed_env("DRAFT_POLL_INTERVAL_SECS", 10)?,
            draft_poll_attempts: parsed_env("DRAFT_POLL_ATTEMPTS", 30)?,
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            database_url = %redact_url(&self.database_url),
            anthropic_api_key = %mask(&self.anthropic_api_key),
            llm_model = %self.llm_model,
            search_api_key = %mask(&self.search_api_key),
            search_base_url = %self.search_base_url,
            drafting_agent_url = %self.drafting_agent_url,
            drafting_agent_token = %mask(&self.drafting_agent_token),
            scout_api_token = %mask(&self.scout_api_token),
            bind = %format!("{}:{}", self.web_host, self.web_port),
            cron_interval_secs = self.cron_interval_secs,
            queue_batch_size = self.queue_batch_size,
            queue_visibility_secs = self.queue_visibility_secs,
            draft_poll_interval_secs = self.draft_poll_interval_secs,
            draft_poll_attempts = self.draft_poll_attempts,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ScoutError::Config(format!(
            "{key} environment variable is required"
        ))),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| ScoutError::Config(format!("{key} must be a number, got {raw:?}"))),
        _ => Ok(default),
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        "<unset>".to_string()
    } else {
        format!("*** ({} chars)", secret.chars().count())
    }
}

/// Drop the password from a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let creds = &url[scheme_end + 3..at];
            let user = creds.split(':').next().unwrap_or("");
            format!("{}{user}:***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_url_hides_password() {
        let redacted = redact_url("postgres://scout:hunter2@db:5432/scoutdesk");
        assert_eq!(redacted, "postgres://scout:***@db:5432/scoutdesk");
    }

    #[test]
    fn redact_url_passes_through_without_credentials() {
        assert_eq!(redact_url("postgres://db/scoutdesk"), "postgres://db/scoutdesk");
    }

    #[test]
    fn mask_never_echoes_the_secret() {
        assert_eq!(mask(""), "<unset>");
        let masked = mask("sk-ant-0123456789");
        assert_eq!(masked, "*** (17 chars)");
    }
}
