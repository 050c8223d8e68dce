//! Placeholder video rendering.
//!
//! When every provider in the chain fails, a short synthetic clip is rendered
//! that shows the failure reason and the start of the prompt. Frames are drawn
//! in-process and streamed as raw RGB into `ffmpeg`.

mod font;
mod frame;

use crate::error::{ClipForgeError, Result};
use crate::storage::ArtifactStore;
use crate::video::VideoArtifact;
use async_trait::async_trait;
use frame::{wrap_prompt, FrameLayout};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Name recorded on artifacts produced by the placeholder.
pub const PLACEHOLDER_GENERATOR: &str = "placeholder";

/// Generator of the always-available fallback video.
#[async_trait]
pub trait Placeholder: Send + Sync {
    /// Renders a clip showing `reason` and an excerpt of `prompt`.
    async fn generate(&self, prompt: &str, reason: &str) -> Result<VideoArtifact>;
}

/// Fixed geometry of the placeholder clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderSpec {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Clip length in seconds.
    pub duration_secs: u32,
    /// Prompt lines stay shorter than this many characters.
    pub line_width: usize,
    /// Prompt lines beyond this are dropped.
    pub max_lines: usize,
    /// Length of the blank last-resort clip, in frames.
    pub blank_frames: u32,
}

impl PlaceholderSpec {
    /// Number of frames in the rendered clip.
    pub fn total_frames(&self) -> u32 {
        self.fps * self.duration_secs
    }
}

impl Default for PlaceholderSpec {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 24,
            duration_secs: 5,
            line_width: 40,
            max_lines: 5,
            blank_frames: 24,
        }
    }
}

/// Renders placeholder clips frame by frame and encodes them with ffmpeg.
#[derive(Debug, Clone)]
pub struct FramePlaceholder {
    store: ArtifactStore,
    ffmpeg: PathBuf,
    spec: PlaceholderSpec,
}

impl FramePlaceholder {
    /// Creates a placeholder writing into `store`, using `ffmpeg` from `PATH`.
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            ffmpeg: PathBuf::from("ffmpeg"),
            spec: PlaceholderSpec::default(),
        }
    }

    /// Uses a specific ffmpeg binary.
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Overrides the clip geometry.
    pub fn with_spec(mut self, spec: PlaceholderSpec) -> Self {
        self.spec = spec;
        self
    }

    /// Returns the clip geometry.
    pub fn spec(&self) -> PlaceholderSpec {
        self.spec
    }

    fn size_arg(&self) -> String {
        format!("{}x{}", self.spec.width, self.spec.height)
    }

    /// Streams every rendered frame into an ffmpeg process writing `path`.
    async fn encode_frames(&self, prompt: &str, reason: &str, path: &Path) -> Result<()> {
        let layout = FrameLayout {
            width: self.spec.width,
            height: self.spec.height,
            total_frames: self.spec.total_frames(),
            reason: reason.to_string(),
            prompt_lines: wrap_prompt(prompt, self.spec.line_width, self.spec.max_lines),
        };
        let base = layout.render_base();

        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &self.size_arg(), "-r", &self.spec.fps.to_string(), "-i", "-"])
            .args(["-c:v", "mpeg4", "-q:v", "5", "-pix_fmt", "yuv420p", "-f", "mp4"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClipForgeError::Encode(format!("failed to start ffmpeg: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClipForgeError::Encode("ffmpeg stdin unavailable".into()))?;

        let mut write_error = None;
        for index in 0..layout.total_frames {
            let frame = layout.render_frame(&base, index);
            if let Err(e) = stdin.write_all(frame.as_raw()).await {
                write_error = Some(e);
                break;
            }
        }
        if write_error.is_none() {
            if let Err(e) = stdin.shutdown().await {
                write_error = Some(e);
            }
        }
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(ClipForgeError::Encode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        if let Some(e) = write_error {
            return Err(ClipForgeError::Encode(format!("writing frames to ffmpeg: {e}")));
        }
        Ok(())
    }

    /// Last resort: a short black clip generated entirely by ffmpeg.
    async fn encode_blank(&self, path: &Path) -> Result<()> {
        let source = format!("color=c=black:s={}:r={}", self.size_arg(), self.spec.fps);
        let output = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-f", "lavfi", "-i", &source])
            .args(["-frames:v", &self.spec.blank_frames.to_string()])
            .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p", "-f", "mp4"])
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ClipForgeError::Encode(format!("failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(ClipForgeError::Encode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Placeholder for FramePlaceholder {
    async fn generate(&self, prompt: &str, reason: &str) -> Result<VideoArtifact> {
        let path = self.store.allocate_in_dir().await?;
        tracing::info!(path = %path.display(), reason, "rendering placeholder video");

        if let Err(e) = self.encode_frames(prompt, reason, &path).await {
            tracing::error!(error = %e, "placeholder encoding failed, writing blank video");
            self.encode_blank(&path).await.map_err(|last| {
                ClipForgeError::Encode(format!("{e}; last resort also failed: {last}"))
            })?;
        }

        Ok(VideoArtifact::new(path, PLACEHOLDER_GENERATOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (width, height, duration) of the first video stream via ffprobe.
    fn media_info(path: &Path) -> (u64, u64, f64) {
        let output = std::process::Command::new("ffprobe")
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height:format=duration"])
            .args(["-of", "json"])
            .arg(path)
            .output()
            .expect("ffprobe should be installed alongside ffmpeg");
        assert!(output.status.success(), "ffprobe rejected {}", path.display());
        let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let stream = &json["streams"][0];
        let duration = json["format"]["duration"].as_str().unwrap().parse().unwrap();
        (
            stream["width"].as_u64().unwrap(),
            stream["height"].as_u64().unwrap(),
            duration,
        )
    }

    #[test]
    fn test_default_spec() {
        let spec = PlaceholderSpec::default();
        assert_eq!((spec.width, spec.height), (640, 480));
        assert_eq!(spec.total_frames(), 120);
        assert_eq!(spec.blank_frames, 24);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_generate_renders_playable_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let placeholder = FramePlaceholder::new(ArtifactStore::new(tmp.path()));

        let artifact = placeholder
            .generate("a cat flying", "All generation methods failed")
            .await
            .unwrap();

        assert_eq!(artifact.generator, PLACEHOLDER_GENERATOR);
        let len = std::fs::metadata(&artifact.path).unwrap().len();
        assert!(len > 0);

        let (width, height, duration) = media_info(&artifact.path);
        assert_eq!((width, height), (640, 480));
        assert!((duration - 5.0).abs() < 0.2, "duration was {duration}");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg and ffprobe"]
    async fn test_blank_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let placeholder = FramePlaceholder::new(ArtifactStore::new(tmp.path()));
        let path = tmp.path().join("blank.mp4");

        placeholder.encode_blank(&path).await.unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
        let (width, height, duration) = media_info(&path);
        assert_eq!((width, height), (640, 480));
        assert!((duration - 1.0).abs() < 0.2, "duration was {duration}");
    }

    #[tokio::test]
    async fn test_missing_encoder_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let placeholder = FramePlaceholder::new(ArtifactStore::new(tmp.path()))
            .with_ffmpeg("/nonexistent/ffmpeg");

        let err = placeholder
            .generate("a cat flying", "All generation methods failed")
            .await
            .unwrap_err();

        match err {
            ClipForgeError::Encode(msg) => assert!(msg.contains("last resort")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
