//! Video provider trait and utilities.

use crate::error::Result;
use crate::storage::ArtifactStore;
use crate::video::types::{GeneratedVideo, VideoArtifact, VideoGenerationRequest, VideoProviderKind};
use async_trait::async_trait;
use std::time::Instant;

/// Trait for video generation providers.
///
/// Implementations submit the request, wait for the remote (or local) job to
/// finish within their own poll budget, and return the encoded video. They
/// never touch task state.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Generates a video from the given request.
    async fn generate(&self, request: &VideoGenerationRequest) -> Result<GeneratedVideo>;

    /// Returns the kind of this provider.
    fn kind(&self) -> VideoProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        self.kind().display_name()
    }

    /// Checks if the provider is configured and authenticated.
    async fn health_check(&self) -> Result<()>;
}

/// Extension trait that turns a provider into a fallback-chain adapter.
#[async_trait]
pub trait VideoProviderExt: VideoProvider {
    /// Generates a video and writes it to a fresh path in `store`.
    async fn generate_to(
        &self,
        request: &VideoGenerationRequest,
        store: &ArtifactStore,
    ) -> Result<VideoArtifact> {
        let start = Instant::now();
        let video = self.generate(request).await?;
        let path = store.allocate_in_dir().await?;
        video.save(&path).await?;

        tracing::info!(
            provider = %self.kind(),
            path = %path.display(),
            bytes = video.size(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "saved generated video"
        );

        Ok(VideoArtifact::new(path, self.name()))
    }
}

impl<T: VideoProvider + ?Sized> VideoProviderExt for T {}
