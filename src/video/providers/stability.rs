//! Stability AI text-to-video provider.

use crate::error::{parse_retry_after, sanitize_error_message, ClipForgeError, Result};
use crate::video::provider::VideoProvider;
use crate::video::types::{GeneratedVideo, VideoGenerationRequest, VideoMetadata, VideoProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const BASE_URL: &str = "https://api.stability.ai";
const TEXT_TO_VIDEO_PATH: &str = "/v1/generation/stable-video-diffusion/text-to-video";

const WIDTH: u32 = 1024;
const HEIGHT: u32 = 576;
const FRAMES: u32 = 24;
const FPS: u32 = 6;

/// Builder for [`StabilityVideoProvider`].
#[derive(Debug, Clone)]
pub struct StabilityVideoProviderBuilder {
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl Default for StabilityVideoProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl StabilityVideoProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `STABILITY_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout, covering generation and download.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<StabilityVideoProvider> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("STABILITY_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                ClipForgeError::Auth("STABILITY_API_KEY not set and no API key provided".into())
            })?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        Ok(StabilityVideoProvider {
            client,
            api_key,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            timeout: self.timeout,
        })
    }
}

/// Stability AI stable video diffusion provider.
///
/// The endpoint answers synchronously; the artifact comes back either inline
/// as base64 or as a URL to download.
#[derive(Debug)]
pub struct StabilityVideoProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl StabilityVideoProvider {
    /// Creates a new [`StabilityVideoProviderBuilder`].
    pub fn builder() -> StabilityVideoProviderBuilder {
        StabilityVideoProviderBuilder::new()
    }

    fn parse_error(
        &self,
        status: u16,
        text: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> ClipForgeError {
        let text = sanitize_error_message(text);
        let message = serde_json::from_str::<StabilityErrorResponse>(&text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(text);

        match status {
            401 | 403 => ClipForgeError::Auth(message),
            400 if message.to_lowercase().contains("content") => {
                ClipForgeError::ContentBlocked(message)
            }
            400 | 422 => ClipForgeError::InvalidRequest(message),
            429 => ClipForgeError::RateLimited {
                retry_after: parse_retry_after(headers).map(Duration::from_secs),
            },
            _ => ClipForgeError::Api { status, message },
        }
    }

    /// Turns the first artifact into video bytes.
    async fn extract_video(&self, response: StabilityResponse) -> Result<Vec<u8>> {
        let artifact = response
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| ClipForgeError::UnexpectedResponse("No video data in response".into()))?;

        if let Some(binary) = artifact.binary {
            use base64::Engine;
            return base64::engine::general_purpose::STANDARD
                .decode(binary.trim())
                .map_err(|e| ClipForgeError::Decode(e.to_string()));
        }

        if let Some(url) = artifact.url {
            return self.download(&url).await;
        }

        Err(ClipForgeError::UnexpectedResponse(
            "No video data in response".into(),
        ))
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
}

#[async_trait]
impl VideoProvider for StabilityVideoProvider {
    async fn generate(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        let start = Instant::now();
        let body = StabilityVideoRequest::from_request(request);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, TEXT_TO_VIDEO_PATH))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClipForgeError::Timeout(self.timeout)
                } else {
                    ClipForgeError::Network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text, &headers));
        }

        let parsed: StabilityResponse = response.json().await?;
        let data = self.extract_video(parsed).await?;
        tracing::debug!(bytes = data.len(), "Stability AI video generation complete");

        Ok(GeneratedVideo::new(
            data,
            "video/mp4",
            VideoProviderKind::Stability,
            VideoMetadata {
                model: Some("stable-video-diffusion".into()),
                duration_ms: Some(start.elapsed().as_millis() as u64),
                video_duration_secs: Some(FRAMES / FPS),
                resolution: Some(format!("{WIDTH}x{HEIGHT}")),
            },
        ))
    }

    fn kind(&self) -> VideoProviderKind {
        VideoProviderKind::Stability
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ClipForgeError::Auth("STABILITY_API_KEY is empty".into()));
        }
        Ok(())
    }
}

// Request types

#[derive(Debug, Serialize)]
struct TextPrompt {
    text: String,
    weight: f32,
}

#[derive(Debug, Serialize)]
struct StabilityVideoRequest {
    text_prompts: Vec<TextPrompt>,
    height: u32,
    width: u32,
    output_format: &'static str,
    cfg_scale: f32,
    motion_bucket_id: u32,
    frames: u32,
    fps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
}

impl StabilityVideoRequest {
    fn from_request(req: &VideoGenerationRequest) -> Self {
        let mut text_prompts = vec![TextPrompt {
            text: req.prompt.clone(),
            weight: 1.0,
        }];
        if let Some(negative) = &req.negative_prompt {
            text_prompts.push(TextPrompt {
                text: negative.clone(),
                weight: -1.0,
            });
        }
        Self {
            text_prompts,
            height: HEIGHT,
            width: WIDTH,
            output_format: "mp4",
            cfg_scale: 7.5,
            motion_bucket_id: 40,
            frames: FRAMES,
            fps: FPS,
            seed: req.seed,
        }
    }
}

// Response types

#[derive(Debug, Deserialize)]
struct StabilityResponse {
    #[serde(default)]
    artifacts: Vec<StabilityArtifact>,
}

#[derive(Debug, Deserialize)]
struct StabilityArtifact {
    #[serde(default, alias = "base64")]
    binary: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StabilityErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> StabilityVideoProvider {
        StabilityVideoProviderBuilder::new()
            .api_key("sta-test")
            .base_url(server.uri())
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_missing_key() {
        std::env::remove_var("STABILITY_API_KEY");
        assert!(matches!(
            StabilityVideoProviderBuilder::new().build(),
            Err(ClipForgeError::Auth(_))
        ));
    }

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_value(StabilityVideoRequest::from_request(
            &VideoGenerationRequest::new("a cat flying").with_negative_prompt("blurry"),
        ))
        .unwrap();

        assert_eq!(json["text_prompts"][0]["text"], "a cat flying");
        assert_eq!(json["text_prompts"][0]["weight"], 1.0);
        assert_eq!(json["text_prompts"][1]["weight"], -1.0);
        assert_eq!(json["width"], 1024);
        assert_eq!(json["height"], 576);
        assert_eq!(json["output_format"], "mp4");
        assert_eq!(json["frames"], 24);
        assert_eq!(json["fps"], 6);
    }

    #[tokio::test]
    async fn test_generate_inline_binary() {
        let server = MockServer::start().await;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"inline mp4");

        Mock::given(method("POST"))
            .and(path(TEXT_TO_VIDEO_PATH))
            .and(header("Authorization", "Bearer sta-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "artifacts": [{"binary": encoded}]
            })))
            .mount(&server)
            .await;

        let video = provider(&server)
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap();
        assert_eq!(video.data, b"inline mp4");
        assert_eq!(video.metadata.resolution.as_deref(), Some("1024x576"));
    }

    #[tokio::test]
    async fn test_generate_artifact_url() {
        let server = MockServer::start().await;
        let uri = server.uri();

        Mock::given(method("POST"))
            .and(path(TEXT_TO_VIDEO_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "artifacts": [{"url": format!("{uri}/files/v.mp4")}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/v.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"linked mp4".to_vec()))
            .mount(&server)
            .await;

        let video = provider(&server)
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap();
        assert_eq!(video.data, b"linked mp4");
    }

    #[tokio::test]
    async fn test_generate_without_artifacts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"artifacts": []})))
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "unexpected response: No video data in response");
    }

    #[tokio::test]
    async fn test_generate_error_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"name": "not_found", "message": "engine not found"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server)
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipForgeError::Api { status: 404, ref message } if message == "engine not found"));
    }
}
