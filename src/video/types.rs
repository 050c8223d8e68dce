//! Core types for video generation.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Video provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoProviderKind {
    /// Wan text-to-video served through the fal.ai queue.
    Fal,
    /// Runway text-to-video.
    Runway,
    /// Stability AI stable video diffusion.
    Stability,
    /// A model run on this machine.
    Local,
}

impl VideoProviderKind {
    /// All kinds in fallback priority order.
    pub const CHAIN_ORDER: [VideoProviderKind; 4] =
        [Self::Fal, Self::Runway, Self::Stability, Self::Local];

    /// Human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Fal => "Wan (fal.ai)",
            Self::Runway => "Runway",
            Self::Stability => "Stability AI",
            Self::Local => "Local diffusion",
        }
    }
}

impl std::fmt::Display for VideoProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fal => write!(f, "fal"),
            Self::Runway => write!(f, "runway"),
            Self::Stability => write!(f, "stability"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Metadata about the video generation process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Model used for generation.
    pub model: Option<String>,
    /// Generation duration in milliseconds.
    pub duration_ms: Option<u64>,
    /// Video duration in seconds.
    pub video_duration_secs: Option<u32>,
    /// Video resolution.
    pub resolution: Option<String>,
}

/// A request to generate a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoGenerationRequest {
    /// The text prompt describing the desired video.
    pub prompt: String,
    /// Desired video duration in seconds.
    pub duration_secs: Option<u32>,
    /// Aspect ratio (e.g., "16:9", "9:16").
    pub aspect_ratio: Option<String>,
    /// Resolution (e.g., "720p").
    pub resolution: Option<String>,
    /// What the video should avoid.
    pub negative_prompt: Option<String>,
    /// Seed for deterministic generation, where supported.
    pub seed: Option<i64>,
}

impl VideoGenerationRequest {
    /// Creates a new request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            duration_secs: None,
            aspect_ratio: None,
            resolution: None,
            negative_prompt: None,
            seed: None,
        }
    }

    /// Sets the desired video duration in seconds.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    /// Sets the aspect ratio.
    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    /// Sets the resolution.
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = Some(resolution.into());
        self
    }

    /// Sets the negative prompt.
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative.into());
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A generated video with its data and metadata.
#[derive(Debug, Clone)]
pub struct GeneratedVideo {
    /// Raw video bytes.
    pub data: Vec<u8>,
    /// MIME type (e.g., "video/mp4").
    pub mime_type: String,
    /// Provider that generated this video.
    pub provider: VideoProviderKind,
    /// Generation metadata.
    pub metadata: VideoMetadata,
}

impl GeneratedVideo {
    /// Creates a new generated video.
    pub fn new(
        data: Vec<u8>,
        mime_type: impl Into<String>,
        provider: VideoProviderKind,
        metadata: VideoMetadata,
    ) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            provider,
            metadata,
        }
    }

    /// Returns the size of the video data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Writes the video to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

/// A finished video file on local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoArtifact {
    /// Location of the playable file.
    pub path: PathBuf,
    /// Name of whatever produced the file.
    pub generator: String,
}

impl VideoArtifact {
    /// Creates an artifact record.
    pub fn new(path: impl Into<PathBuf>, generator: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            generator: generator.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_order() {
        assert_eq!(
            VideoProviderKind::CHAIN_ORDER,
            [
                VideoProviderKind::Fal,
                VideoProviderKind::Runway,
                VideoProviderKind::Stability,
                VideoProviderKind::Local,
            ]
        );
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&VideoProviderKind::Stability).unwrap();
        assert_eq!(json, "\"stability\"");
        assert_eq!(VideoProviderKind::Runway.to_string(), "runway");
    }

    #[test]
    fn test_request_builder() {
        let req = VideoGenerationRequest::new("a cat flying")
            .with_duration(5)
            .with_aspect_ratio("16:9")
            .with_negative_prompt("blurry")
            .with_seed(7);
        assert_eq!(req.prompt, "a cat flying");
        assert_eq!(req.duration_secs, Some(5));
        assert_eq!(req.aspect_ratio.as_deref(), Some("16:9"));
        assert_eq!(req.negative_prompt.as_deref(), Some("blurry"));
        assert_eq!(req.seed, Some(7));
        assert!(req.resolution.is_none());
    }

    #[tokio::test]
    async fn test_generated_video_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let video = GeneratedVideo::new(
            vec![0, 0, 0, 24, b'f', b't', b'y', b'p'],
            "video/mp4",
            VideoProviderKind::Local,
            VideoMetadata::default(),
        );
        video.save(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), video.size());
    }
}
