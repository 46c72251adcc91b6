//! reqwest-backed [`RemoteSessionClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::RemoteSessionClient;
use super::types::*;
use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError, Error};

const NO_RESPONSE: &str = "No response from server. Please try again.";
const GENERIC_SERVER_ERROR: &str = "An error occurred";
const UNEXPECTED: &str = "An unexpected error occurred";

/// HTTP client for the consultation engine.
#[derive(Clone)]
pub struct HttpSessionClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSessionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url).map_err(|e| ConfigError::InvalidValue {
            key: "api_url".into(),
            message: format!("{base_url}: {e}"),
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, Error> {
        Self::new(&config.api_url, config.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.execute(path, self.client.get(self.url(path))).await?;
        decode(path, resp).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .execute(path, self.client.post(self.url(path)).json(body))
            .await?;
        decode(path, resp).await
    }

    /// Send the request and turn any non-2xx answer into a `ClientError`.
    async fn execute(
        &self,
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        debug!(path, "Engine request");
        let resp = request.send().await.map_err(|e| {
            warn!(path, "Engine unreachable: {e}");
            ClientError::transport(NO_RESPONSE)
        })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = error_detail(&body).unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string());
        warn!(path, status = status.as_u16(), "Engine returned error: {message}");
        Err(ClientError::server(status.as_u16(), message))
    }
}

async fn decode<T: DeserializeOwned>(
    path: &str,
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let bytes = resp.bytes().await.map_err(|e| {
        warn!(path, "Failed to read engine response: {e}");
        ClientError::transport(NO_RESPONSE)
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        warn!(path, "Unexpected engine response shape: {e}");
        ClientError::transport(UNEXPECTED)
    })
}

/// Pull a display message out of an error body.
///
/// The engine answers `{"detail": "..."}`; request validation failures carry
/// a list of `{"msg": "..."}` objects under the same key.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .iter()
            .find_map(|i| i.get("msg").and_then(|m| m.as_str()))
            .map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl RemoteSessionClient for HttpSessionClient {
    async fn start_conversation(
        &self,
        request: StartConversationRequest,
    ) -> Result<ConversationResponse, ClientError> {
        self.post_json("/conversation/start", &request).await
    }

    async fn continue_conversation(
        &self,
        request: ContinueConversationRequest,
    ) -> Result<ConversationResponse, ClientError> {
        self.post_json("/conversation/continue", &request).await
    }

    async fn generate_preview(&self, session_id: &str) -> Result<PreviewResponse, ClientError> {
        let query = SessionQuery {
            session_id: session_id.to_string(),
        };
        self.post_json("/preview/generate", &query).await
    }

    async fn capture_lead(
        &self,
        request: LeadCaptureRequest,
    ) -> Result<LeadCaptureAck, ClientError> {
        self.post_json("/lead/capture", &request).await
    }

    async fn fetch_progress(&self, session_id: &str) -> Result<ProgressSnapshot, ClientError> {
        self.get_json(&format!("/progress/{session_id}")).await
    }

    async fn fetch_report(&self, session_id: &str) -> Result<SessionRecord, ClientError> {
        let query = SessionQuery {
            session_id: session_id.to_string(),
        };
        self.post_json("/report/get", &query).await
    }

    async fn refine_report(
        &self,
        request: RefineRequest,
    ) -> Result<RefinementResponse, ClientError> {
        self.post_json("/report/refine", &request).await
    }

    async fn fetch_report_artifact(&self, session_id: &str) -> Result<Vec<u8>, ClientError> {
        let path = format!("/report/{session_id}/download-pdf");
        let resp = self.execute(&path, self.client.get(self.url(&path))).await?;
        let bytes = resp.bytes().await.map_err(|e| {
            warn!(path, "Failed to read report download: {e}");
            ClientError::transport(NO_RESPONSE)
        })?;
        Ok(bytes.to_vec())
    }

    async fn social_proof(&self) -> Result<SocialProof, ClientError> {
        self.get_json("/social-proof").await
    }

    async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.get_json("/health").await
    }
}
