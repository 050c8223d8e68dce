//! Ordered provider fallback.

use crate::error::sanitize_error_message;
use crate::placeholder::Placeholder;
use crate::storage::ArtifactStore;
use crate::task::TaskState;
use crate::video::{VideoArtifact, VideoGenerationRequest, VideoProvider, VideoProviderExt};
use std::sync::Arc;

/// Reason passed to the placeholder when every provider failed.
pub const ALL_FAILED_REASON: &str = "All generation methods failed";

/// Result of running the chain for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A provider produced the video.
    Generated {
        /// The provider's video.
        video: VideoArtifact,
        /// Failures of the providers tried before it.
        trail: Vec<String>,
    },
    /// Every provider failed and the placeholder was rendered.
    Fallback {
        /// The placeholder video.
        video: VideoArtifact,
        /// One failure per provider, in chain order.
        trail: Vec<String>,
    },
    /// Every provider failed and so did the placeholder.
    Failed {
        /// Provider failures followed by the placeholder error.
        error: String,
        /// One failure per provider, in chain order.
        trail: Vec<String>,
    },
}

impl ChainOutcome {
    /// Converts the outcome into the terminal task state and its error trail.
    pub fn into_task_state(self) -> (TaskState, Vec<String>) {
        match self {
            Self::Generated { video, trail } => (
                TaskState::Completed {
                    video,
                    is_fallback: false,
                },
                trail,
            ),
            Self::Fallback { video, trail } => (
                TaskState::Completed {
                    video,
                    is_fallback: true,
                },
                trail,
            ),
            Self::Failed { error, trail } => (TaskState::Failed { error }, trail),
        }
    }

    /// The accumulated failure messages.
    pub fn trail(&self) -> &[String] {
        match self {
            Self::Generated { trail, .. }
            | Self::Fallback { trail, .. }
            | Self::Failed { trail, .. } => trail,
        }
    }
}

/// Tries each provider once, in order, then falls back to the placeholder.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn VideoProvider>>,
    store: ArtifactStore,
    placeholder: Arc<dyn Placeholder>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl FallbackChain {
    /// Creates a chain over `providers`, highest priority first.
    pub fn new(
        providers: Vec<Arc<dyn VideoProvider>>,
        store: ArtifactStore,
        placeholder: Arc<dyn Placeholder>,
    ) -> Self {
        Self {
            providers,
            store,
            placeholder,
        }
    }

    /// Providers in the order they are tried.
    pub fn providers(&self) -> &[Arc<dyn VideoProvider>] {
        &self.providers
    }

    /// Directory the chain writes videos into.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Runs the chain for one request.
    pub async fn run(&self, request: &VideoGenerationRequest) -> ChainOutcome {
        let mut trail = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            tracing::info!(provider = provider.name(), "trying provider");
            match provider.generate_to(request, &self.store).await {
                Ok(video) => {
                    tracing::info!(
                        provider = provider.name(),
                        path = %video.path.display(),
                        "provider succeeded"
                    );
                    return ChainOutcome::Generated { video, trail };
                }
                Err(e) => {
                    let cause = sanitize_error_message(&e.to_string());
                    tracing::warn!(
                        provider = provider.name(),
                        kind = %e.failure_kind(),
                        error = %cause,
                        "provider failed"
                    );
                    trail.push(format!("{} generation failed: {cause}", provider.name()));
                }
            }
        }

        match self.placeholder.generate(&request.prompt, ALL_FAILED_REASON).await {
            Ok(video) => ChainOutcome::Fallback { video, trail },
            Err(e) => {
                tracing::error!(error = %e, "placeholder generation failed");
                let mut lines = trail.clone();
                lines.push(format!("Placeholder generation failed: {e}"));
                ChainOutcome::Failed {
                    error: lines.join("\n"),
                    trail,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{ClipForgeError, Result};
    use crate::video::{GeneratedVideo, VideoMetadata, VideoProviderKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that counts calls and either fails or returns a few bytes.
    pub(crate) struct CountingProvider {
        pub kind: VideoProviderKind,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl CountingProvider {
        pub fn new(kind: VideoProviderKind, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                fail,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VideoProvider for CountingProvider {
        async fn generate(&self, _request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClipForgeError::Api {
                    status: 503,
                    message: "service unavailable".into(),
                });
            }
            Ok(GeneratedVideo::new(
                b"mp4".to_vec(),
                "video/mp4",
                self.kind,
                VideoMetadata::default(),
            ))
        }

        fn kind(&self) -> VideoProviderKind {
            self.kind
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Placeholder that writes a stub file, or fails when `fail` is set.
    pub(crate) struct StubPlaceholder {
        pub store: ArtifactStore,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl Placeholder for StubPlaceholder {
        async fn generate(&self, _prompt: &str, reason: &str) -> Result<VideoArtifact> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ClipForgeError::Encode("ffmpeg not found".into()));
            }
            let path = self.store.allocate_in_dir().await?;
            tokio::fs::write(&path, reason).await?;
            Ok(VideoArtifact::new(path, "placeholder"))
        }
    }

    fn chain(
        providers: &[Arc<CountingProvider>],
        placeholder: Arc<StubPlaceholder>,
    ) -> FallbackChain {
        let store = placeholder.store.clone();
        FallbackChain::new(
            providers
                .iter()
                .map(|p| p.clone() as Arc<dyn VideoProvider>)
                .collect(),
            store,
            placeholder,
        )
    }

    fn placeholder(dir: &std::path::Path, fail: bool) -> Arc<StubPlaceholder> {
        Arc::new(StubPlaceholder {
            store: ArtifactStore::new(dir),
            fail,
            calls: AtomicUsize::new(0),
        })
    }

    fn all_kinds(fail: [bool; 4]) -> Vec<Arc<CountingProvider>> {
        VideoProviderKind::CHAIN_ORDER
            .iter()
            .zip(fail)
            .map(|(kind, fail)| CountingProvider::new(*kind, fail))
            .collect()
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let providers = all_kinds([false, false, false, false]);
        let placeholder = placeholder(tmp.path(), false);
        let chain = chain(&providers, placeholder.clone());

        let outcome = chain.run(&VideoGenerationRequest::new("a cat flying")).await;

        match &outcome {
            ChainOutcome::Generated { video, trail } => {
                assert_eq!(video.generator, "Wan (fal.ai)");
                assert!(video.path.exists());
                assert!(trail.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(providers[0].calls(), 1);
        assert!(providers[1..].iter().all(|p| p.calls() == 0));
        assert_eq!(placeholder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_success_keeps_earlier_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let providers = all_kinds([true, true, false, false]);
        let chain = chain(&providers, placeholder(tmp.path(), false));

        let outcome = chain.run(&VideoGenerationRequest::new("a cat flying")).await;

        assert_eq!(outcome.trail().len(), 2);
        assert!(outcome.trail()[1].starts_with("Runway generation failed: "));
        let (state, _) = outcome.into_task_state();
        assert!(matches!(
            state,
            TaskState::Completed {
                is_fallback: false,
                ..
            }
        ));
        assert_eq!(providers[3].calls(), 0);
    }

    #[tokio::test]
    async fn test_all_fail_renders_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let providers = all_kinds([true; 4]);
        let placeholder = placeholder(tmp.path(), false);
        let chain = chain(&providers, placeholder.clone());

        let outcome = chain.run(&VideoGenerationRequest::new("a cat flying")).await;

        let names: Vec<&str> = VideoProviderKind::CHAIN_ORDER
            .iter()
            .map(|k| k.display_name())
            .collect();
        assert_eq!(outcome.trail().len(), 4);
        for (entry, name) in outcome.trail().iter().zip(&names) {
            assert_eq!(
                entry,
                &format!("{name} generation failed: API error: 503 - service unavailable")
            );
        }
        assert!(providers.iter().all(|p| p.calls() == 1));
        assert_eq!(placeholder.calls.load(Ordering::SeqCst), 1);

        match outcome {
            ChainOutcome::Fallback { video, .. } => {
                let body = std::fs::read_to_string(&video.path).unwrap();
                assert_eq!(body, ALL_FAILED_REASON);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_placeholder_failure_fails_task() {
        let tmp = tempfile::tempdir().unwrap();
        let providers = all_kinds([true; 4]);
        let chain = chain(&providers, placeholder(tmp.path(), true));

        let outcome = chain.run(&VideoGenerationRequest::new("a cat flying")).await;

        let (state, trail) = outcome.into_task_state();
        assert_eq!(trail.len(), 4);
        match state {
            TaskState::Failed { error } => {
                assert!(error.starts_with("Wan (fal.ai) generation failed"));
                assert!(error.ends_with("video encoding failed: ffmpeg not found"));
                assert_eq!(error.lines().count(), 5);
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_goes_straight_to_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let chain = chain(&[], placeholder(tmp.path(), false));

        let outcome = chain.run(&VideoGenerationRequest::new("a cat flying")).await;
        assert!(matches!(outcome, ChainOutcome::Fallback { ref trail, .. } if trail.is_empty()));
    }
}
