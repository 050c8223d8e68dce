#![warn(missing_docs)]
//! ClipForge - prompt-to-video service with provider fallback.
//!
//! A prompt is registered as a task and handed to a background worker that
//! tries each configured text-to-video provider in priority order. The first
//! success wins; when every provider fails, a placeholder clip explaining the
//! failure is rendered instead, so every task ends with something to show.
//!
//! # Quick Start - Service
//!
//! ```no_run
//! use clipforge::{server, Settings};
//!
//! #[tokio::main]
//! async fn main() -> clipforge::Result<()> {
//!     let settings = Settings::load()?;
//!     let runner = settings.build_runner()?;
//!     let app = server::router(server::AppState::new(runner));
//!     let listener = tokio::net::TcpListener::bind(settings.bind_addr()).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - One Provider
//!
//! ```no_run
//! use clipforge::{RunwayVideoProvider, VideoGenerationRequest, VideoProvider};
//!
//! #[tokio::main]
//! async fn main() -> clipforge::Result<()> {
//!     let provider = RunwayVideoProvider::builder().build()?;
//!     let request = VideoGenerationRequest::new("A cat flying over a city");
//!     let video = provider.generate(&request).await?;
//!     video.save("cat.mp4").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! ## Video Providers (fallback order)
//! - `fal-video`: Wan 2.2 through fal.ai, directly or via the Hugging Face router
//! - `runway-video`: Runway
//! - `stability-video`: Stability AI
//! - `local-video`: a local model run as a child process
//!
//! ## Meta Features
//! - `video`: All video providers
//! - `cli`: Command-line interface

pub mod chain;
pub mod config;
mod error;
pub mod placeholder;
pub mod runner;
pub mod server;
pub mod storage;
pub mod task;
pub mod video;

// Re-export error types at crate root
pub use error::{ClipForgeError, FailureKind, Result};

pub use chain::{ChainOutcome, FallbackChain};
pub use crate::config::Settings;
pub use placeholder::{FramePlaceholder, Placeholder};
pub use runner::TaskRunner;
pub use storage::ArtifactStore;
pub use task::{InMemoryTaskStore, Task, TaskId, TaskState, TaskStatus, TaskStore, TaskView};

pub use video::providers::UnavailableProvider;
pub use video::{
    GeneratedVideo, VideoArtifact, VideoGenerationRequest, VideoMetadata, VideoProvider,
    VideoProviderExt, VideoProviderKind,
};

#[cfg(feature = "fal-video")]
pub use video::providers::{FalBackend, FalVideoModel, FalVideoProvider, FalVideoProviderBuilder};

#[cfg(feature = "runway-video")]
pub use video::providers::{RunwayVideoProvider, RunwayVideoProviderBuilder};

#[cfg(feature = "stability-video")]
pub use video::providers::{StabilityVideoProvider, StabilityVideoProviderBuilder};

#[cfg(feature = "local-video")]
pub use video::providers::{LocalVideoProvider, LocalVideoProviderBuilder};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{ClipForgeError, Result};
    pub use crate::task::{TaskId, TaskStatus, TaskStore};
    pub use crate::video::{
        GeneratedVideo, VideoGenerationRequest, VideoProvider, VideoProviderExt,
    };
    pub use crate::{FallbackChain, Settings, TaskRunner};

    #[cfg(feature = "fal-video")]
    pub use crate::video::providers::FalVideoProvider;

    #[cfg(feature = "runway-video")]
    pub use crate::video::providers::RunwayVideoProvider;

    #[cfg(feature = "stability-video")]
    pub use crate::video::providers::StabilityVideoProvider;

    #[cfg(feature = "local-video")]
    pub use crate::video::providers::LocalVideoProvider;
}
