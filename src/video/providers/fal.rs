//! Wan text-to-video through the fal.ai queue API.
//!
//! The same queue protocol is reachable two ways: directly at fal.ai with a
//! `FAL_KEY`, or through the Hugging Face inference router with an
//! `HF_TOKEN`, which forwards to fal.ai.

use crate::error::{parse_retry_after, sanitize_error_message, ClipForgeError, Result};
use crate::video::provider::VideoProvider;
use crate::video::types::{GeneratedVideo, VideoGenerationRequest, VideoMetadata, VideoProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const FAL_QUEUE_URL: &str = "https://queue.fal.run";
const HF_ROUTER_URL: &str = "https://router.huggingface.co/fal-ai";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How requests reach the fal.ai queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FalBackend {
    /// Hugging Face inference router, authenticated with `HF_TOKEN` (default).
    #[default]
    HuggingFace,
    /// fal.ai directly, authenticated with `FAL_KEY`.
    Direct,
}

impl FalBackend {
    fn default_base_url(&self) -> &'static str {
        match self {
            Self::HuggingFace => HF_ROUTER_URL,
            Self::Direct => FAL_QUEUE_URL,
        }
    }

    fn env_var(&self) -> &'static str {
        match self {
            Self::HuggingFace => "HF_TOKEN",
            Self::Direct => "FAL_KEY",
        }
    }

    fn auth_header(&self, key: &str) -> String {
        match self {
            Self::HuggingFace => format!("Bearer {key}"),
            Self::Direct => format!("Key {key}"),
        }
    }

    /// Query string the router needs to reach the queue subdomain.
    fn query(&self) -> &'static str {
        match self {
            Self::HuggingFace => "?_subdomain=queue",
            Self::Direct => "",
        }
    }
}

/// Wan model variants hosted on fal.ai.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FalVideoModel {
    /// Wan 2.2 A14B text-to-video (default).
    #[default]
    Wan22,
    /// Wan 2.1 text-to-video.
    Wan21,
    /// Custom fal.ai model ID.
    Custom(String),
}

impl FalVideoModel {
    /// Returns the fal.ai model identifier string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Wan22 => "fal-ai/wan/v2.2-a14b/text-to-video",
            Self::Wan21 => "fal-ai/wan-t2v",
            Self::Custom(id) => id,
        }
    }
}

/// Builder for [`FalVideoProvider`].
#[derive(Debug, Clone)]
pub struct FalVideoProviderBuilder {
    api_key: Option<String>,
    backend: FalBackend,
    model: FalVideoModel,
    base_url: Option<String>,
    poll_interval: Duration,
    timeout: Duration,
}

impl Default for FalVideoProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: FalBackend::default(),
            model: FalVideoModel::default(),
            base_url: None,
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600), // 10 minutes for video
        }
    }
}

impl FalVideoProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `HF_TOKEN` or `FAL_KEY` depending on the backend.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Selects the route to the fal.ai queue.
    pub fn backend(mut self, backend: FalBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the model variant.
    pub fn model(mut self, model: FalVideoModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the queue base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the polling interval for async generation.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the maximum time one generation may take, from submit to download.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<FalVideoProvider> {
        let env_var = self.backend.env_var();
        let api_key = self
            .api_key
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ClipForgeError::Auth(format!("{env_var} not set and no API key provided"))
            })?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| self.backend.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout.min(CONNECT_TIMEOUT))
            .build()?;

        Ok(FalVideoProvider {
            client,
            api_key,
            backend: self.backend,
            model: self.model,
            base_url,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
        })
    }
}

/// Wan text-to-video provider backed by the fal.ai queue.
///
/// The whole attempt, including stalled requests, is bounded by the
/// configured timeout and ends in [`ClipForgeError::Timeout`].
#[derive(Debug)]
pub struct FalVideoProvider {
    client: reqwest::Client,
    api_key: String,
    backend: FalBackend,
    model: FalVideoModel,
    base_url: String,
    poll_interval: Duration,
    timeout: Duration,
}

/// Status and result locations for one queued request.
#[derive(Debug, PartialEq, Eq)]
struct QueueUrls {
    status: String,
    result: String,
    /// Result location built from the full model id, for nested model paths.
    result_fallback: String,
}

impl FalVideoProvider {
    /// Creates a new [`FalVideoProviderBuilder`].
    pub fn builder() -> FalVideoProviderBuilder {
        FalVideoProviderBuilder::new()
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> ClipForgeError {
        if let Ok(error_resp) = serde_json::from_str::<FalErrorResponse>(text) {
            let detail = sanitize_error_message(&error_resp.message());
            let lower = detail.to_lowercase();
            if lower.contains("unauthorized") || lower.contains("invalid key") {
                return ClipForgeError::Auth(detail);
            }
            if lower.contains("rate") && lower.contains("limit") {
                let retry_after = parse_retry_after(headers).map(Duration::from_secs);
                return ClipForgeError::RateLimited { retry_after };
            }
            return ClipForgeError::Api {
                status,
                message: detail,
            };
        }

        let text = sanitize_error_message(text);
        if status == 401 || status == 403 {
            return ClipForgeError::Auth(text);
        }
        if status == 429 {
            let retry_after = parse_retry_after(headers).map(Duration::from_secs);
            return ClipForgeError::RateLimited { retry_after };
        }

        ClipForgeError::Api {
            status,
            message: text,
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text, &headers))
    }

    /// Works out where to poll and fetch for a submitted request.
    ///
    /// Direct calls use the URLs fal.ai hands back. Through the router, the
    /// path of fal's `response_url` is re-rooted onto the router base so the
    /// token stays scoped to Hugging Face.
    fn queue_urls(&self, submit: &FalSubmitResponse) -> Result<QueueUrls> {
        let model_id = self.model.as_str();
        let query = self.backend.query();
        let result_fallback = format!(
            "{}/{}/requests/{}{}",
            self.base_url, model_id, submit.request_id, query
        );

        match self.backend {
            FalBackend::Direct => Ok(QueueUrls {
                status: submit.status_url.clone(),
                result: submit.response_url.clone(),
                result_fallback,
            }),
            FalBackend::HuggingFace => {
                let parsed = reqwest::Url::parse(&submit.response_url).map_err(|e| {
                    ClipForgeError::UnexpectedResponse(format!(
                        "fal.ai returned an invalid response_url: {e}"
                    ))
                })?;
                let path = parsed.path().trim_end_matches('/');
                Ok(QueueUrls {
                    status: format!("{}{}/status{}", self.base_url, path, query),
                    result: format!("{}{}{}", self.base_url, path, query),
                    result_fallback,
                })
            }
        }
    }

    /// Submits a generation request to the queue.
    async fn submit(&self, request: &VideoGenerationRequest) -> Result<FalSubmitResponse> {
        let url = format!(
            "{}/{}{}",
            self.base_url,
            self.model.as_str(),
            self.backend.query()
        );
        let body = FalVideoRequest::from_request(request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.backend.auth_header(&self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = self.check(response).await?;

        Ok(response.json().await?)
    }

    /// Polls the queue until the request completes or the time budget runs out.
    async fn poll_until_ready(&self, request_id: &str, status_url: &str) -> Result<()> {
        let start = Instant::now();

        loop {
            if start.elapsed() > self.timeout {
                return Err(ClipForgeError::Timeout(self.timeout));
            }

            let response = self
                .client
                .get(status_url)
                .header("Authorization", self.backend.auth_header(&self.api_key))
                .send()
                .await?;
            let response = self.check(response).await?;
            let status_response: FalStatusResponse = response.json().await?;

            match status_response.status.as_str() {
                "COMPLETED" => return Ok(()),
                "IN_QUEUE" | "IN_PROGRESS" => {
                    tracing::debug!(
                        request_id = %request_id,
                        status = %status_response.status,
                        elapsed_secs = start.elapsed().as_secs(),
                        "polling fal.ai video generation"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
                "FAILED" => {
                    let reason = status_response
                        .error
                        .map(|e| sanitize_error_message(&e))
                        .unwrap_or_else(|| "fal.ai video generation failed".into());
                    return Err(ClipForgeError::VideoGeneration(reason));
                }
                other => {
                    return Err(ClipForgeError::UnexpectedResponse(format!(
                        "fal.ai returned unexpected status: {other}"
                    )));
                }
            }
        }
    }

    /// Fetches the completed result, trying the model-id based URL on 404/405.
    async fn fetch_result(&self, urls: &QueueUrls) -> Result<String> {
        let response = self
            .client
            .get(&urls.result)
            .header("Authorization", self.backend.auth_header(&self.api_key))
            .send()
            .await?;

        let status = response.status().as_u16();
        let response = if status == 404 || status == 405 {
            tracing::debug!(
                response_url = %urls.result,
                status,
                "fal.ai result url rejected, falling back to model id url"
            );
            self.client
                .get(&urls.result_fallback)
                .header("Authorization", self.backend.auth_header(&self.api_key))
                .send()
                .await?
        } else {
            response
        };
        let response = self.check(response).await?;

        let result: FalVideoResult = response.json().await?;
        Ok(result.video.url)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClipForgeError::Api {
                status: response.status().as_u16(),
                message: "Failed to download video".into(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Submit, poll, fetch and download, without the overall time bound.
    async fn run_attempt(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        let start = Instant::now();
        let model_id = self.model.as_str().to_string();

        let submit = self.submit(request).await?;
        tracing::debug!(request_id = %submit.request_id, model = %model_id, "submitted fal.ai video generation request");

        let urls = self.queue_urls(&submit)?;
        self.poll_until_ready(&submit.request_id, &urls.status).await?;
        tracing::debug!(request_id = %submit.request_id, "fal.ai video generation complete");

        let video_url = self.fetch_result(&urls).await?;
        tracing::debug!(url = %video_url, "fetched fal.ai video result");

        let data = self.download(&video_url).await?;

        Ok(GeneratedVideo::new(
            data,
            "video/mp4",
            VideoProviderKind::Fal,
            VideoMetadata {
                model: Some(model_id),
                duration_ms: Some(start.elapsed().as_millis() as u64),
                video_duration_secs: request.duration_secs,
                resolution: request.resolution.clone(),
            },
        ))
    }
}

#[async_trait]
impl VideoProvider for FalVideoProvider {
    async fn generate(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        match tokio::time::timeout(self.timeout, self.run_attempt(request)).await {
            Ok(Err(ClipForgeError::Network(e))) if e.is_timeout() => {
                Err(ClipForgeError::Timeout(self.timeout))
            }
            Ok(result) => result,
            Err(_) => Err(ClipForgeError::Timeout(self.timeout)),
        }
    }

    fn kind(&self) -> VideoProviderKind {
        VideoProviderKind::Fal
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ClipForgeError::Auth(format!(
                "{} is empty",
                self.backend.env_var()
            )));
        }
        Ok(())
    }
}

// Request types

#[derive(Debug, Serialize)]
struct FalVideoRequest {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    /// "480p", "580p" or "720p" for Wan 2.2.
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl FalVideoRequest {
    fn from_request(request: &VideoGenerationRequest) -> Self {
        Self {
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            resolution: request.resolution.clone(),
            duration: request.duration_secs,
            seed: request.seed,
        }
    }
}

// Response types

#[derive(Debug, Deserialize)]
struct FalSubmitResponse {
    request_id: String,
    status_url: String,
    response_url: String,
}

#[derive(Debug, Deserialize)]
struct FalStatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FalVideoResult {
    video: FalVideoData,
}

#[derive(Debug, Deserialize)]
struct FalVideoData {
    url: String,
}

/// fal.ai reports `detail`, the router reports `error`.
#[derive(Debug, Deserialize)]
struct FalErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl FalErrorResponse {
    fn message(self) -> String {
        self.detail
            .or(self.error)
            .unwrap_or_else(|| "unknown fal.ai error".into())
    }
}
