//! Runway text-to-video provider.

use crate::error::{parse_retry_after, sanitize_error_message, ClipForgeError, Result};
use crate::video::provider::VideoProvider;
use crate::video::types::{GeneratedVideo, VideoGenerationRequest, VideoMetadata, VideoProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://api.runwayml.com";
const GENERATIONS_PATH: &str = "/v1/text-to-video/generations";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for [`RunwayVideoProvider`].
#[derive(Debug, Clone)]
pub struct RunwayVideoProviderBuilder {
    api_key: Option<String>,
    base_url: String,
    poll_interval: Duration,
    max_attempts: u32,
    request_timeout: Duration,
}

impl Default for RunwayVideoProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: BASE_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            max_attempts: 60, // 5 minutes at the default interval
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl RunwayVideoProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `RUNWAY_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the delay between status checks.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how many status checks are made before giving up.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Caps each HTTP request (submit, status check, download).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<RunwayVideoProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("RUNWAY_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ClipForgeError::Auth("RUNWAY_API_KEY not set and no API key provided".into())
            })?;

        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.request_timeout.min(CONNECT_TIMEOUT))
            .build()?;

        Ok(RunwayVideoProvider {
            client,
            api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            poll_interval: self.poll_interval,
            max_attempts: self.max_attempts.max(1),
            request_timeout: self.request_timeout,
        })
    }
}

/// Runway text-to-video provider.
///
/// Submits a generation, then checks its status a fixed number of times
/// before giving up with [`ClipForgeError::Timeout`]. Every request is
/// capped by the request timeout, so a stalled connection also ends in
/// [`ClipForgeError::Timeout`].
#[derive(Debug)]
pub struct RunwayVideoProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_attempts: u32,
    request_timeout: Duration,
}

impl RunwayVideoProvider {
    /// Creates a new [`RunwayVideoProviderBuilder`].
    pub fn builder() -> RunwayVideoProviderBuilder {
        RunwayVideoProviderBuilder::new()
    }

    /// Total time the poll loop may spend sleeping.
    fn poll_budget(&self) -> Duration {
        self.poll_interval * self.max_attempts
    }

    /// Sends a request, reporting an elapsed request timeout as [`ClipForgeError::Timeout`].
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| self.map_reqwest(e))
    }

    fn map_reqwest(&self, e: reqwest::Error) -> ClipForgeError {
        if e.is_timeout() {
            ClipForgeError::Timeout(self.request_timeout)
        } else {
            ClipForgeError::Network(e)
        }
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> ClipForgeError {
        let text = sanitize_error_message(text);
        match status {
            401 | 403 => ClipForgeError::Auth(text),
            400 | 422 => ClipForgeError::InvalidRequest(text),
            429 => ClipForgeError::RateLimited {
                retry_after: parse_retry_after(headers).map(Duration::from_secs),
            },
            _ => {
                let lower = text.to_lowercase();
                if lower.contains("safety") || lower.contains("moderation") {
                    ClipForgeError::ContentBlocked(text)
                } else {
                    ClipForgeError::Api {
                        status,
                        message: text,
                    }
                }
            }
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

    /// Submits a generation request, returning the generation id.
    async fn submit(&self, request: &VideoGenerationRequest) -> Result<String> {
        let body = RunwayVideoRequest::from_request(request);

        let response = self
            .send(
                self.client
                    .post(format!("{}{}", self.base_url, GENERATIONS_PATH))
                    .bearer_auth(&self.api_key)
                    .header("Content-Type", "application/json")
                    .json(&body),
            )
            .await?;
        let response = self.check(response).await?;

        let submit: RunwaySubmitResponse =
            response.json().await.map_err(|e| self.map_reqwest(e))?;
        submit
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClipForgeError::UnexpectedResponse("Runway returned no generation id".into()))
    }

    /// Polls until the generation succeeds, returning the output URL.
    async fn poll_until_ready(&self, generation_id: &str) -> Result<String> {
        let url = format!("{}{}/{}", self.base_url, GENERATIONS_PATH, generation_id);

        for attempt in 1..=self.max_attempts {
            let response = self
                .send(self.client.get(&url).bearer_auth(&self.api_key))
                .await?;
            let response = self.check(response).await?;
            let status: RunwayStatusResponse =
                response.json().await.map_err(|e| self.map_reqwest(e))?;

            match status.status.as_str() {
                "SUCCEEDED" => {
                    return status
                        .output_url
                        .filter(|u| !u.is_empty())
                        .ok_or_else(|| {
                            ClipForgeError::UnexpectedResponse(
                                "Runway generation succeeded without output_url".into(),
                            )
                        });
                }
                "FAILED" => {
                    let reason = status
                        .error
                        .map(|e| sanitize_error_message(&e))
                        .unwrap_or_else(|| "Unknown error".into());
                    return Err(ClipForgeError::VideoGeneration(reason));
                }
                other => {
                    tracing::debug!(
                        generation_id = %generation_id,
                        status = %other,
                        attempt,
                        max_attempts = self.max_attempts,
                        "polling Runway video generation"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ClipForgeError::Timeout(self.poll_budget()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(self.client.get(url)).await?;

        if !response.status().is_success() {
            return Err(ClipForgeError::Api {
                status: response.status().as_u16(),
                message: "Failed to download video".into(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.map_reqwest(e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl VideoProvider for RunwayVideoProvider {
    async fn generate(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        let start = Instant::now();

        let generation_id = self.submit(request).await?;
        tracing::debug!(generation_id = %generation_id, "submitted Runway video generation request");

        let output_url = self.poll_until_ready(&generation_id).await?;
        tracing::debug!(url = %output_url, "Runway video generation complete");

        let data = self.download(&output_url).await?;

        Ok(GeneratedVideo::new(
            data,
            "video/mp4",
            VideoProviderKind::Runway,
            VideoMetadata {
                model: None,
                duration_ms: Some(start.elapsed().as_millis() as u64),
                video_duration_secs: Some(NUM_FRAMES / FPS),
                resolution: None,
            },
        ))
    }

    fn kind(&self) -> VideoProviderKind {
        VideoProviderKind::Runway
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ClipForgeError::Auth("RUNWAY_API_KEY is empty".into()));
        }
        Ok(())
    }
}

const NUM_FRAMES: u32 = 120;
const FPS: u32 = 30;

#[derive(Debug, Serialize)]
struct RunwayVideoRequest {
    prompt: String,
    num_frames: u32,
    fps: u32,
    guidance_scale: f32,
    /// Amount of motion.
    motion_bucket_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl RunwayVideoRequest {
    fn from_request(req: &VideoGenerationRequest) -> Self {
        let num_frames = req
            .duration_secs
            .map(|secs| secs * FPS)
            .unwrap_or(NUM_FRAMES);
        Self {
            prompt: req.prompt.clone(),
            num_frames,
            fps: FPS,
            guidance_scale: 7.5,
            motion_bucket_id: 40,
            seed: req.seed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RunwaySubmitResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunwayStatusResponse {
    status: String,
    #[serde(default)]
    output_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}
