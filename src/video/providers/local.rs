//! Local on-device video generation.
//!
//! Runs a configured inference program (for example a diffusers script or a
//! stable-diffusion.cpp build) as a child process that writes an mp4.

use crate::error::{ClipForgeError, Result};
use crate::video::provider::VideoProvider;
use crate::video::types::{GeneratedVideo, VideoGenerationRequest, VideoMetadata, VideoProviderKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use uuid::Uuid;

const PROMPT_PLACEHOLDER: &str = "{prompt}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Builder for [`LocalVideoProvider`].
#[derive(Debug, Clone)]
pub struct LocalVideoProviderBuilder {
    program: Option<String>,
    args: Vec<String>,
    model: Option<String>,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl Default for LocalVideoProviderBuilder {
    fn default() -> Self {
        Self {
            program: None,
            args: vec![
                "--prompt".into(),
                PROMPT_PLACEHOLDER.into(),
                "--output".into(),
                OUTPUT_PLACEHOLDER.into(),
            ],
            model: None,
            scratch_dir: std::env::temp_dir(),
            timeout: Duration::from_secs(1800), // CPU inference is slow
        }
    }
}

impl LocalVideoProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the program to run. Falls back to `LOCAL_VIDEO_PROGRAM` env var.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    /// Replaces the argument template. `{prompt}` and `{output}` are substituted.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Records the model name for metadata.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets where the child writes its output before it is read back.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sets the wall-clock budget for one run.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider.
    pub fn build(self) -> Result<LocalVideoProvider> {
        let program = self
            .program
            .or_else(|| std::env::var("LOCAL_VIDEO_PROGRAM").ok())
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                ClipForgeError::ProviderNotAvailable(
                    "no local video program configured".into(),
                )
            })?;

        if !self.args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(ClipForgeError::Config(format!(
                "local video arguments must contain {OUTPUT_PLACEHOLDER}"
            )));
        }

        Ok(LocalVideoProvider {
            program,
            args: self.args,
            model: self.model,
            scratch_dir: self.scratch_dir,
            timeout: self.timeout,
        })
    }
}

/// Local on-device video generation provider.
#[derive(Debug)]
pub struct LocalVideoProvider {
    program: String,
    args: Vec<String>,
    model: Option<String>,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl LocalVideoProvider {
    /// Creates a new [`LocalVideoProviderBuilder`].
    pub fn builder() -> LocalVideoProviderBuilder {
        LocalVideoProviderBuilder::new()
    }

    fn render_args(&self, prompt: &str, output: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| {
                a.replace(PROMPT_PLACEHOLDER, prompt)
                    .replace(OUTPUT_PLACEHOLDER, output)
            })
            .collect()
    }

    async fn run(&self, prompt: &str, output: &Path) -> Result<()> {
        let args = self.render_args(prompt, &output.to_string_lossy());

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ClipForgeError::ProviderNotAvailable(format!(
                    "failed to start {}: {e}",
                    self.program
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ClipForgeError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
            let tail = lines[lines.len().saturating_sub(3)..].join(" | ");
            return Err(ClipForgeError::VideoGeneration(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                tail.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl VideoProvider for LocalVideoProvider {
    async fn generate(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        let start = Instant::now();
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let output = self
            .scratch_dir
            .join(format!("clipforge-local-{}.mp4", Uuid::new_v4()));

        tracing::debug!(program = %self.program, output = %output.display(), "starting local video generation");
        let result = self.run(&request.prompt, &output).await;

        let data = match result {
            Ok(()) => tokio::fs::read(&output).await.map_err(|e| {
                ClipForgeError::UnexpectedResponse(format!(
                    "local generator did not write {}: {e}",
                    output.display()
                ))
            }),
            Err(e) => Err(e),
        };
        // The artifact store keeps its own copy.
        let _ = tokio::fs::remove_file(&output).await;
        let data = data?;

        if data.is_empty() {
            return Err(ClipForgeError::UnexpectedResponse(
                "local generator wrote an empty file".into(),
            ));
        }

        Ok(GeneratedVideo::new(
            data,
            "video/mp4",
            VideoProviderKind::Local,
            VideoMetadata {
                model: self.model.clone(),
                duration_ms: Some(start.elapsed().as_millis() as u64),
                video_duration_secs: None,
                resolution: None,
            },
        ))
    }

    fn kind(&self) -> VideoProviderKind {
        VideoProviderKind::Local
    }

    async fn health_check(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(ClipForgeError::ProviderNotAvailable(
                "local video program is empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, dir: &std::path::Path) -> LocalVideoProvider {
        LocalVideoProviderBuilder::new()
            .program("sh")
            .args(["-c", script, "sh", "{prompt}", "{output}"])
            .scratch_dir(dir)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_output_placeholder() {
        let result = LocalVideoProviderBuilder::new()
            .program("wan-t2v")
            .args(["--prompt", "{prompt}"])
            .build();
        assert!(matches!(result, Err(ClipForgeError::Config(_))));
    }

    #[test]
    fn test_render_args() {
        let provider = LocalVideoProviderBuilder::new()
            .program("wan-t2v")
            .build()
            .unwrap();
        assert_eq!(
            provider.render_args("a cat flying", "/tmp/x.mp4"),
            vec!["--prompt", "a cat flying", "--output", "/tmp/x.mp4"]
        );
    }

    #[tokio::test]
    async fn test_generate_reads_output() {
        let dir = tempfile::tempdir().unwrap();
        let provider = shell(r#"printf '%s' "$1" > "$2""#, dir.path());

        let video = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap();

        assert_eq!(video.data, b"a cat flying");
        assert_eq!(video.provider, VideoProviderKind::Local);
        // Scratch output is removed after reading.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_generate_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let provider = shell("echo 'CUDA not available' >&2; exit 3", dir.path());

        let err = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        match err {
            ClipForgeError::VideoGeneration(msg) => assert!(msg.contains("CUDA not available")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_generate_missing_output() {
        let dir = tempfile::tempdir().unwrap();
        let provider = shell("exit 0", dir.path());

        let err = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipForgeError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalVideoProviderBuilder::new()
            .program("sh")
            .args(["-c", "sleep 5", "sh", "{output}"])
            .scratch_dir(dir.path())
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        let err = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipForgeError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_generate_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalVideoProviderBuilder::new()
            .program("/nonexistent/clipforge-wan")
            .scratch_dir(dir.path())
            .build()
            .unwrap();

        let err = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClipForgeError::ProviderNotAvailable(_)));
    }
}
