//! Video generation providers, in fallback order.

#[cfg(feature = "fal-video")]
mod fal;
#[cfg(feature = "fal-video")]
pub use fal::{FalBackend, FalVideoModel, FalVideoProvider, FalVideoProviderBuilder};

#[cfg(feature = "runway-video")]
mod runway;
#[cfg(feature = "runway-video")]
pub use runway::{RunwayVideoProvider, RunwayVideoProviderBuilder};

#[cfg(feature = "stability-video")]
mod stability;
#[cfg(feature = "stability-video")]
pub use stability::{StabilityVideoProvider, StabilityVideoProviderBuilder};

#[cfg(feature = "local-video")]
mod local;
#[cfg(feature = "local-video")]
pub use local::{LocalVideoProvider, LocalVideoProviderBuilder};

mod unavailable;
pub use unavailable::UnavailableProvider;
