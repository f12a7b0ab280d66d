//! Camera sources.
//!
//! The scanner never talks to a camera directly. It goes through a
//! `MediaSourceProvider`, which owns device enumeration and permission
//! acquisition, and reads frames through the `VideoSink` the stream is bound to.
//!
//! Providers:
//! - Synthetic camera (`stub://...`) for tests and demos
//! - Still image files (any local path)
//! - USB/V4L2 devices (feature: camera-v4l2, `v4l2://` or `/dev/video*`)
//!
//! Providers MUST NOT:
//! - Store frames to disk
//! - Log frame content

mod device;
#[cfg(feature = "camera-v4l2")]
mod normalize;
mod provider;
pub mod still;
mod stream;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use std::sync::Arc;

use anyhow::Result;

pub use device::{
    select_constraints, DeviceDescriptor, DeviceSelection, FacingMode, StreamConstraints,
};
pub use provider::MediaSourceProvider;
pub use still::StillImageProvider;
pub use stream::{MediaStream, VideoSink, VideoTrack};
pub use synthetic::{SyntheticConfig, SyntheticProvider, SyntheticTrack};
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Provider;

/// Open the provider named by a source string.
///
/// `synthetic` seeds the synthetic camera when `source` is a `stub://` URL.
pub fn open_provider(
    source: &str,
    synthetic: SyntheticConfig,
) -> Result<Arc<dyn MediaSourceProvider>> {
    if source.starts_with("stub://") {
        return Ok(Arc::new(SyntheticProvider::new(SyntheticConfig {
            url: source.to_string(),
            ..synthetic
        })));
    }
    if source.starts_with("v4l2://") || source.starts_with("/dev/video") {
        #[cfg(feature = "camera-v4l2")]
        {
            return Ok(Arc::new(V4l2Provider::new(source)));
        }
        #[cfg(not(feature = "camera-v4l2"))]
        {
            anyhow::bail!("camera source {} requires the camera-v4l2 feature", source)
        }
    }
    Ok(Arc::new(StillImageProvider::open(source)?))
}
