use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use scoutdesk_common::{Result, SearchHit};

use super::{check_status, http_client, transport_error};
use crate::traits::{SearchKind, SearchProvider};

const SERVICE: &str = "search provider";

/// Serper-style research API: `POST {base}/news` and `POST {base}/search`.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawHit>,
    #[serde(default)]
    news: Vec<RawHit>,
    #[serde(default)]
    organic: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(default)]
    title: String,
    url: Option<String>,
    link: Option<String>,
    #[serde(default)]
    snippet: String,
    date: Option<String>,
}

impl HttpSearchProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

/// Path, result cap and recency window per lookup kind.
fn request_shape(kind: SearchKind) -> (&'static str, u32, &'static str) {
    match kind {
        SearchKind::News => ("news", 5, "qdr:w"),
        SearchKind::Web => ("search", 10, "qdr:m"),
    }
}

fn into_hits(response: SearchResponse) -> Vec<SearchHit> {
    response
        .results
        .into_iter()
        .chain(response.news)
        .chain(response.organic)
        .filter_map(|raw| {
            let url = raw.url.or(raw.link).filter(|u| !u.is_empty())?;
            Some(SearchHit {
                title: raw.title,
                url,
                snippet: raw.snippet,
                date: raw.date,
            })
        })
        .collect()
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, kind: SearchKind, query: &str) -> Result<Vec<SearchHit>> {
        let (path, num, tbs) = request_shape(kind);
        let url = format!("{}/{}", self.base_url, path);

        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": num, "tbs": tbs }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let resp = check_status(SERVICE, resp).await?;

        let body: SearchResponse = resp.json().await.map_err(|e| transport_error(SERVICE, e))?;
        let hits = into_hits(body);
        debug!(kind = kind.as_str(), query, hits = hits.len(), "Search lookup");
        Ok(hits)
    }
}
