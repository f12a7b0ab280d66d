//! Still image source.
//!
//! Serves one decoded image file as a camera that never changes. Useful for
//! running the pipeline against a photographed barcode. Only local paths are
//! accepted.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::RgbaImage;

use crate::error::AcquireError;
use crate::geometry::FrameDimensions;

use super::device::{DeviceDescriptor, StreamConstraints};
use super::provider::MediaSourceProvider;
use super::stream::{MediaStream, VideoTrack};

pub struct StillImageProvider {
    path: PathBuf,
    frame: Arc<RgbaImage>,
    dimensions: FrameDimensions,
}

impl StillImageProvider {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.to_string_lossy().contains("://") {
            return Err(anyhow!(
                "still image source only supports local paths (got {})",
                path.display()
            ));
        }
        let frame = image::open(path)
            .with_context(|| format!("open image {}", path.display()))?
            .to_rgba8();
        let dimensions = FrameDimensions::new(frame.width(), frame.height())
            .ok_or_else(|| anyhow!("image {} is empty", path.display()))?;
        Ok(Self::from_image(path, frame, dimensions))
    }

    fn from_image(path: &Path, frame: RgbaImage, dimensions: FrameDimensions) -> Self {
        Self {
            path: path.to_path_buf(),
            frame: Arc::new(frame),
            dimensions,
        }
    }

    fn device_id(&self) -> String {
        self.path.display().to_string()
    }
}

#[async_trait]
impl MediaSourceProvider for StillImageProvider {
    fn name(&self) -> &'static str {
        "still"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, AcquireError> {
        let label = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.device_id());
        Ok(vec![DeviceDescriptor {
            id: Some(self.device_id()),
            label,
            facing: None,
        }])
    }

    async fn acquire_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<MediaStream, AcquireError> {
        if let StreamConstraints::Device(id) = &constraints {
            if *id != self.device_id() {
                return Err(AcquireError::NoDeviceFound);
            }
        }
        log::info!("StillImageProvider: serving {}", self.path.display());
        let track = Arc::new(StillTrack {
            label: self.device_id(),
            frame: self.frame.clone(),
            dimensions: self.dimensions,
            live: AtomicBool::new(true),
        });
        Ok(MediaStream::new(
            format!("still:{}", self.device_id()),
            vec![track as Arc<dyn VideoTrack>],
        ))
    }
}

struct StillTrack {
    label: String,
    frame: Arc<RgbaImage>,
    dimensions: FrameDimensions,
    live: AtomicBool,
}

impl VideoTrack for StillTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Option<FrameDimensions> {
        Some(self.dimensions)
    }

    fn draw_frame(&self, target: &mut RgbaImage) -> bool {
        if target.dimensions() != self.frame.dimensions() {
            return false;
        }
        target.copy_from_slice(self.frame.as_raw());
        true
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}
