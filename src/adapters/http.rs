//! HTTP adapter for the TeamFlow run service.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::sse::SseDecoder;
use super::{
    ApiError, CreatedRun, EventStream, ExportFormat, RunApi, StatusReply, OP_CANCEL, OP_CREATE,
    OP_EVENTS, OP_EXPORT, OP_REGENERATE, OP_STATUS,
};
use crate::domain::{RunId, StatusSnapshot, StepName};

/// Run service client over HTTP
pub struct HttpRunApi {
    /// Base URL without trailing slash
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpRunApi {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build an endpoint URL
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn run_url(&self, run_id: &RunId, suffix: &str) -> String {
        self.url(&format!("/runs/{}{}", run_id, suffix))
    }

    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(operation, status = status.as_u16(), "Service returned an error");
        Err(ApiError::status(operation, status.as_u16(), &body))
    }

    async fn json<T: DeserializeOwned>(
        operation: &'static str,
        response: Response,
    ) -> Result<T, ApiError> {
        let body = response
            .text()
            .await
            .map_err(|source| ApiError::Transport { operation, source })?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            operation,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RunApi for HttpRunApi {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_run(&self, idea: &str) -> Result<CreatedRun, ApiError> {
        let request = self
            .client
            .post(self.url("/runs"))
            .json(&json!({ "idea": idea }));
        let response = self.send(OP_CREATE, request).await?;
        Self::json(OP_CREATE, response).await
    }

    async fn run_status(&self, run_id: &RunId) -> Result<StatusSnapshot, ApiError> {
        let request = self.client.get(self.run_url(run_id, ""));
        let response = self.send(OP_STATUS, request).await?;
        Self::json(OP_STATUS, response).await
    }

    async fn cancel_run(&self, run_id: &RunId) -> Result<StatusReply, ApiError> {
        let request = self.client.post(self.run_url(run_id, "/cancel"));
        let response = self.send(OP_CANCEL, request).await?;
        Self::json(OP_CANCEL, response).await
    }

    async fn regenerate_step(
        &self,
        run_id: &RunId,
        step: StepName,
    ) -> Result<StatusReply, ApiError> {
        let request = self
            .client
            .post(self.run_url(run_id, &format!("/steps/{}/regenerate", step)));
        let response = self.send(OP_REGENERATE, request).await?;
        Self::json(OP_REGENERATE, response).await
    }

    async fn export_run(&self, run_id: &RunId, format: ExportFormat) -> Result<String, ApiError> {
        let request = self
            .client
            .get(self.run_url(run_id, "/export"))
            .query(&[("format", format.as_query())]);
        let response = self.send(OP_EXPORT, request).await?;
        response.text().await.map_err(|source| ApiError::Transport {
            operation: OP_EXPORT,
            source,
        })
    }

    async fn open_events(&self, run_id: &RunId, start: u64) -> Result<EventStream, ApiError> {
        let request = self
            .client
            .get(self.run_url(run_id, "/events"))
            .query(&[("start", start)])
            .header(ACCEPT, "text/event-stream");
        let response = self.send(OP_EVENTS, request).await?;

        let bytes = Box::pin(response.bytes_stream());
        let state = (bytes, SseDecoder::new(), VecDeque::new(), false);
        let stream = futures_util::stream::unfold(
            state,
            |(mut bytes, mut decoder, mut pending, mut done)| async move {
                loop {
                    if let Some(message) = pending.pop_front() {
                        return Some((Ok(message), (bytes, decoder, pending, done)));
                    }
                    if done {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(source)) => {
                            done = true;
                            let err = ApiError::Transport {
                                operation: OP_EVENTS,
                                source,
                            };
                            return Some((Err(err), (bytes, decoder, pending, done)));
                        }
                        None => done = true,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}
