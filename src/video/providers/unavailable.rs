//! Placeholder slot for a provider that could not be configured.

use crate::error::{ClipForgeError, Result};
use crate::video::provider::VideoProvider;
use crate::video::types::{GeneratedVideo, VideoGenerationRequest, VideoProviderKind};
use async_trait::async_trait;

/// Keeps a provider's position in the fallback chain when it cannot run.
///
/// Every call fails with the reason captured at startup (missing credential,
/// feature disabled), so the error trail still lists the provider in order.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    kind: VideoProviderKind,
    reason: String,
}

impl UnavailableProvider {
    /// Creates a slot for `kind` that always fails with `reason`.
    pub fn new(kind: VideoProviderKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Why the provider is unavailable.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl VideoProvider for UnavailableProvider {
    async fn generate(&self, _request: &VideoGenerationRequest) -> Result<GeneratedVideo> {
        Err(ClipForgeError::ProviderNotAvailable(self.reason.clone()))
    }

    fn kind(&self) -> VideoProviderKind {
        self.kind
    }

    async fn health_check(&self) -> Result<()> {
        Err(ClipForgeError::ProviderNotAvailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_fails_with_reason() {
        let provider = UnavailableProvider::new(
            VideoProviderKind::Runway,
            "RUNWAY_API_KEY not set and no API key provided",
        );
        assert_eq!(provider.name(), "Runway");

        let err = provider
            .generate(&VideoGenerationRequest::new("a cat flying"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "provider not available: RUNWAY_API_KEY not set and no API key provided"
        );
        assert!(provider.health_check().await.is_err());
    }
}
