use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use scoutdesk_common::{Result, ScoutError};

use super::{check_status, http_client, transport_error};
use crate::traits::{CreateSession, DraftSummary, DraftingAgent};

const SERVICE: &str = "drafting agent";

/// Client for the drafting-agent service's session API.
pub struct HttpDraftingAgent {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DraftList {
    #[serde(default)]
    data: Vec<DraftSummary>,
}

impl HttpDraftingAgent {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(format!("{}{}", self.base_url, path)))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(format!("{}{}", self.base_url, path)))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }
}

#[async_trait]
impl DraftingAgent for HttpDraftingAgent {
    async fn create_session(&self, request: &CreateSession) -> Result<String> {
        let resp = self
            .post("/sessions")
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let resp = check_status(SERVICE, resp).await?;

        let created: SessionCreated = resp.json().await.map_err(|e| transport_error(SERVICE, e))?;
        if created.id.is_empty() {
            return Err(ScoutError::UpstreamUnavailable(
                "drafting agent returned an empty session id".into(),
            ));
        }
        Ok(created.id)
    }

    async fn send_message(&self, session_id: &str, message: &str) -> Result<()> {
        let resp = self
            .post(&format!("/sessions/{session_id}/chat"))
            .json(&json!({ "message": message }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        check_status(SERVICE, resp).await?;
        Ok(())
    }

    async fn list_drafts(&self, session_id: &str) -> Result<Vec<DraftSummary>> {
        let resp = self
            .get(&format!("/sessions/{session_id}/drafts"))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let resp = check_status(SERVICE, resp).await?;

        let list: DraftList = resp.json().await.map_err(|e| transport_error(SERVICE, e))?;
        Ok(list.data)
    }

    async fn publish(&self, session_id: &str, slug: &str, author: &str) -> Result<()> {
        let resp = self
            .post(&format!("/sessions/{session_id}/publish"))
            .json(&json!({ "slug": slug, "author": author }))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        check_status(SERVICE, resp).await?;
        Ok(())
    }
}
