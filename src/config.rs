//! Service settings and chain assembly.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `CLIPFORGE_*` environment variables (`__` separates nested keys, so
//! `CLIPFORGE_RUNWAY__MAX_ATTEMPTS=10` sets `runway.max_attempts`).
//! Provider credentials additionally fall back to each provider's
//! conventional variable (`HF_TOKEN`, `FAL_KEY`, `RUNWAY_API_KEY`,
//! `STABILITY_API_KEY`).

use crate::chain::FallbackChain;
use crate::error::{ClipForgeError, Result};
use crate::placeholder::FramePlaceholder;
use crate::runner::TaskRunner;
use crate::storage::ArtifactStore;
use crate::task::InMemoryTaskStore;
use crate::video::providers::UnavailableProvider;
use crate::video::{VideoProvider, VideoProviderKind};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(any(
    feature = "fal-video",
    feature = "runway-video",
    feature = "stability-video",
    feature = "local-video"
))]
use std::time::Duration;

/// Default settings file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "clipforge.toml";

/// Top-level service settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Address the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Directory for generated and placeholder videos.
    pub videos_dir: PathBuf,
    /// ffmpeg binary used for placeholder videos.
    pub ffmpeg: PathBuf,
    /// Refuse to start without a primary provider credential.
    pub require_primary: bool,
    /// Primary provider.
    pub fal: FalSettings,
    /// Secondary provider.
    pub runway: RunwaySettings,
    /// Tertiary provider.
    pub stability: StabilitySettings,
    /// On-device provider.
    pub local: LocalSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            videos_dir: PathBuf::from("videos"),
            ffmpeg: PathBuf::from("ffmpeg"),
            require_primary: false,
            fal: FalSettings::default(),
            runway: RunwaySettings::default(),
            stability: StabilitySettings::default(),
            local: LocalSettings::default(),
        }
    }
}

/// Wan via fal.ai.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FalSettings {
    /// API key; falls back to `HF_TOKEN` or `FAL_KEY`.
    pub api_key: Option<String>,
    /// `huggingface` or `direct`. Picked from the available credential when unset.
    pub backend: Option<String>,
    /// fal.ai model id.
    pub model: Option<String>,
    /// Seconds between status checks.
    pub poll_interval_secs: u64,
    /// Seconds before giving up on a queued request.
    pub timeout_secs: u64,
}

impl Default for FalSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            backend: None,
            model: None,
            poll_interval_secs: 3,
            timeout_secs: 600,
        }
    }
}

/// Runway.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunwaySettings {
    /// API key; falls back to `RUNWAY_API_KEY`.
    pub api_key: Option<String>,
    /// Seconds between status checks.
    pub poll_interval_secs: u64,
    /// Status checks before giving up.
    pub max_attempts: u32,
    /// Cap in seconds on each HTTP request.
    pub request_timeout_secs: u64,
}

impl Default for RunwaySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            poll_interval_secs: 5,
            max_attempts: 60,
            request_timeout_secs: 60,
        }
    }
}

/// Stability AI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    /// API key; falls back to `STABILITY_API_KEY`.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_secs: 300,
        }
    }
}

/// Local model run as a child process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Program to run; falls back to `LOCAL_VIDEO_PROGRAM`.
    pub program: Option<String>,
    /// Arguments, with `{prompt}` and `{output}` substituted.
    pub args: Option<Vec<String>>,
    /// Model name recorded in video metadata.
    pub model: Option<String>,
    /// Seconds before the child is killed.
    pub timeout_secs: u64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            program: None,
            args: None,
            model: None,
            timeout_secs: 1800,
        }
    }
}

impl Settings {
    /// Loads settings from `clipforge.toml` (if present) and the environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE), false)
    }

    /// Loads settings from `path` and the environment.
    ///
    /// A missing file is an error only when `required` is set.
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(required))
            .add_source(
                Environment::with_prefix("CLIPFORGE")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(" ")
                    .with_list_parse_key("local.args")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Address string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the providers in chain order.
    ///
    /// A provider that cannot be configured keeps its slot as an
    /// [`UnavailableProvider`] and a warning is logged. With
    /// `require_primary`, a primary that cannot be configured is an error.
    pub fn build_providers(&self) -> Result<Vec<Arc<dyn VideoProvider>>> {
        let mut providers = Vec::with_capacity(VideoProviderKind::CHAIN_ORDER.len());

        for kind in VideoProviderKind::CHAIN_ORDER {
            let built = match kind {
                VideoProviderKind::Fal => self.build_fal(),
                VideoProviderKind::Runway => self.build_runway(),
                VideoProviderKind::Stability => self.build_stability(),
                VideoProviderKind::Local => self.build_local(),
            };

            match built {
                Ok(provider) => {
                    tracing::info!(provider = provider.name(), "provider configured");
                    providers.push(provider);
                }
                Err(e) if kind == VideoProviderKind::Fal && self.require_primary => {
                    return Err(ClipForgeError::Config(format!(
                        "primary provider {} is required: {e}",
                        kind.display_name()
                    )));
                }
                Err(e) => {
                    tracing::warn!(
                        provider = kind.display_name(),
                        error = %e,
                        "provider unavailable"
                    );
                    providers.push(Arc::new(UnavailableProvider::new(kind, e.to_string())));
                }
            }
        }

        Ok(providers)
    }

    /// Builds the fallback chain with the frame placeholder.
    pub fn build_chain(&self) -> Result<FallbackChain> {
        let store = ArtifactStore::new(&self.videos_dir);
        let placeholder = FramePlaceholder::new(store.clone()).with_ffmpeg(&self.ffmpeg);
        Ok(FallbackChain::new(
            self.build_providers()?,
            store,
            Arc::new(placeholder),
        ))
    }

    /// Builds a runner over an in-memory task store.
    pub fn build_runner(&self) -> Result<TaskRunner> {
        Ok(TaskRunner::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(self.build_chain()?),
        ))
    }

    #[cfg(feature = "fal-video")]
    fn build_fal(&self) -> Result<Arc<dyn VideoProvider>> {
        use crate::video::providers::{FalBackend, FalVideoModel, FalVideoProvider};

        let backend = match self.fal.backend.as_deref() {
            Some("huggingface") | Some("hf") => FalBackend::HuggingFace,
            Some("direct") | Some("fal") => FalBackend::Direct,
            Some(other) => {
                return Err(ClipForgeError::Config(format!(
                    "unknown fal backend `{other}`, expected `huggingface` or `direct`"
                )))
            }
            None if self.fal.api_key.is_none()
                && std::env::var_os("HF_TOKEN").is_none()
                && std::env::var_os("FAL_KEY").is_some() =>
            {
                FalBackend::Direct
            }
            None => FalBackend::HuggingFace,
        };

        let mut builder = FalVideoProvider::builder()
            .backend(backend)
            .poll_interval(Duration::from_secs(self.fal.poll_interval_secs))
            .timeout(Duration::from_secs(self.fal.timeout_secs));
        if let Some(key) = &self.fal.api_key {
            builder = builder.api_key(key);
        }
        if let Some(id) = &self.fal.model {
            let model = [FalVideoModel::Wan22, FalVideoModel::Wan21]
                .into_iter()
                .find(|m| m.as_str() == id.as_str())
                .unwrap_or_else(|| FalVideoModel::Custom(id.clone()));
            builder = builder.model(model);
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "fal-video"))]
    fn build_fal(&self) -> Result<Arc<dyn VideoProvider>> {
        Err(ClipForgeError::ProviderNotAvailable(
            "built without the `fal-video` feature".into(),
        ))
    }

    #[cfg(feature = "runway-video")]
    fn build_runway(&self) -> Result<Arc<dyn VideoProvider>> {
        use crate::video::providers::RunwayVideoProvider;

        let mut builder = RunwayVideoProvider::builder()
            .poll_interval(Duration::from_secs(self.runway.poll_interval_secs))
            .max_attempts(self.runway.max_attempts)
            .request_timeout(Duration::from_secs(self.runway.request_timeout_secs));
        if let Some(key) = &self.runway.api_key {
            builder = builder.api_key(key);
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "runway-video"))]
    fn build_runway(&self) -> Result<Arc<dyn VideoProvider>> {
        Err(ClipForgeError::ProviderNotAvailable(
            "built without the `runway-video` feature".into(),
        ))
    }

    #[cfg(feature = "stability-video")]
    fn build_stability(&self) -> Result<Arc<dyn VideoProvider>> {
        use crate::video::providers::StabilityVideoProvider;

        let mut builder = StabilityVideoProvider::builder()
            .timeout(Duration::from_secs(self.stability.timeout_secs));
        if let Some(key) = &self.stability.api_key {
            builder = builder.api_key(key);
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "stability-video"))]
    fn build_stability(&self) -> Result<Arc<dyn VideoProvider>> {
        Err(ClipForgeError::ProviderNotAvailable(
            "built without the `stability-video` feature".into(),
        ))
    }

    #[cfg(feature = "local-video")]
    fn build_local(&self) -> Result<Arc<dyn VideoProvider>> {
        use crate::video::providers::LocalVideoProvider;

        let mut builder =
            LocalVideoProvider::builder().timeout(Duration::from_secs(self.local.timeout_secs));
        if let Some(program) = &self.local.program {
            builder = builder.program(program);
        }
        if let Some(args) = &self.local.args {
            builder = builder.args(args.iter().cloned());
        }
        if let Some(model) = &self.local.model {
            builder = builder.model(model);
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "local-video"))]
    fn build_local(&self) -> Result<Arc<dyn VideoProvider>> {
        Err(ClipForgeError::ProviderNotAvailable(
            "built without the `local-video` feature".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("clipforge.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr(), "0.0.0.0:8000");
        assert_eq!(settings.videos_dir, PathBuf::from("videos"));
        assert_eq!(settings.fal.timeout_secs, 600);
        assert_eq!(settings.runway.max_attempts, 60);
        assert_eq!(settings.runway.poll_interval_secs, 5);
        assert_eq!(settings.runway.request_timeout_secs, 60);
        assert_eq!(settings.local.timeout_secs, 1800);
        assert!(!settings.require_primary);
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&tmp.path().join("absent.toml"), false).unwrap();
        assert_eq!(settings.stability.timeout_secs, 300);
        assert!(Settings::load_from(&tmp.path().join("absent.toml"), true).is_err());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
port = 9100
videos_dir = "/var/lib/clipforge"

[runway]
max_attempts = 10

[local]
program = "wan-local"
args = ["--text", "{prompt}", "--out", "{output}"]
"#,
        );

        let settings = Settings::load_from(&path, true).unwrap();
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.videos_dir, PathBuf::from("/var/lib/clipforge"));
        assert_eq!(settings.runway.max_attempts, 10);
        assert_eq!(settings.runway.poll_interval_secs, 5);
        assert_eq!(settings.local.program.as_deref(), Some("wan-local"));
        assert_eq!(settings.local.args.as_ref().map(Vec::len), Some(4));
    }

    #[cfg(feature = "video")]
    #[test]
    fn test_providers_keep_chain_order() {
        let mut settings = Settings::default();
        settings.fal.api_key = Some("fal-test".into());
        settings.fal.backend = Some("direct".into());
        settings.runway.api_key = Some("runway-test".into());
        settings.stability.api_key = Some("stability-test".into());
        settings.local.program = Some("true".into());

        let providers = settings.build_providers().unwrap();
        let kinds: Vec<_> = providers.iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, VideoProviderKind::CHAIN_ORDER);
    }

    #[cfg(feature = "fal-video")]
    #[test]
    fn test_unknown_backend_is_unavailable_or_fatal() {
        let mut settings = Settings::default();
        settings.fal.api_key = Some("fal-test".into());
        settings.fal.backend = Some("carrier-pigeon".into());

        let providers = settings.build_providers().unwrap();
        assert_eq!(providers.len(), 4);
        assert_eq!(providers[0].kind(), VideoProviderKind::Fal);

        settings.require_primary = true;
        let Err(err) = settings.build_providers() else {
            panic!("expected an error for an unknown backend");
        };
        assert!(matches!(err, ClipForgeError::Config(ref msg) if msg.contains("carrier-pigeon")));
    }
}
