//! HTTP implementations of the outbound collaborator seams.

pub mod drafting;
pub mod search;

pub use drafting::HttpDraftingAgent;
pub use search::HttpSearchProvider;

use std::time::Duration;

use scoutdesk_common::ScoutError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn transport_error(service: &str, e: reqwest::Error) -> ScoutError {
    ScoutError::UpstreamUnavailable(format!("{service}: {e}"))
}

/// Turn a non-2xx response into `UpstreamUnavailable`, keeping the body for the log.
async fn check_status(service: &str, resp: reqwest::Response) -> Result<reqwest::Response, ScoutError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ScoutError::UpstreamUnavailable(format!(
        "{service} returned HTTP {}: {}",
        status.as_u16(),
        ai_client::util::truncate_to_char_boundary(&body, 500)
    )))
}
