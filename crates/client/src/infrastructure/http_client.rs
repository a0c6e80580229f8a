//! Prompt queue REST client

use std::time::Duration;

use async_trait::async_trait;
use daydream_shared::{SubmitPromptRequest, SubmitPromptResponse};
use reqwest::{Client, Response};
use url::Url;

use crate::ports::outbound::{ApiError, PromptApiPort};
use crate::queue_types::StreamId;

/// Default timeout for queue requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for `/streams/{stream_id}/prompts/queue`
#[derive(Clone)]
pub struct HttpPromptApi {
    client: Client,
    base_url: String,
}

impl HttpPromptApi {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn queue_url(&self, stream_id: &StreamId) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{}: cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["streams", stream_id.as_str(), "prompts", "queue"]);
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl PromptApiPort for HttpPromptApi {
    async fn submit_prompt(
        &self,
        stream_id: &StreamId,
        text: &str,
    ) -> Result<SubmitPromptResponse, ApiError> {
        let url = self.queue_url(stream_id)?;
        let body = SubmitPromptRequest {
            text: text.to_string(),
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn add_random_prompt(&self, stream_id: &StreamId) -> Result<(), ApiError> {
        let url = self.queue_url(stream_id)?;

        let response = self
            .client
            .put(url)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }
}
