//! Frame sampling.
//!
//! Each tick the sampler draws the full source frame into an offscreen buffer, then
//! copies the crop region into the display buffer handed to the decoder.
//!
//! - The offscreen buffer is reused across ticks and only reallocated when the
//!   source size changes.
//! - The display buffer is resized to the crop every tick; resizing discards its
//!   previous contents.
//! - A sink without frame metadata yields no sample. That is the startup race
//!   between stream binding and the first frame, not an error.

use image::{imageops, RgbaImage};

use crate::geometry::{compute_crop_box, CropBox, CropConfig, FrameDimensions};
use crate::ingest::VideoSink;

/// Whole-pixel rectangle used to copy the crop out of the offscreen buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRegion {
    /// Snap a crop box to the pixel grid, staying inside the frame.
    pub fn from_crop(crop: &CropBox, frame: FrameDimensions) -> Self {
        let (x, width) = snap_axis(crop.x, crop.width, frame.width);
        let (y, height) = snap_axis(crop.y, crop.height, frame.height);
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

fn snap_axis(origin: f64, extent: f64, limit: u32) -> (u32, u32) {
    let start = (origin.floor().max(0.0) as u32).min(limit.saturating_sub(1));
    let length = (extent.round().max(1.0) as u32).min(limit - start);
    (start, length)
}

/// Output of one sampling pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampledFrame {
    pub dimensions: FrameDimensions,
    pub crop: CropBox,
    pub region: PixelRegion,
}

pub struct FrameSampler {
    crop_config: CropConfig,
    offscreen: RgbaImage,
    display: RgbaImage,
}

impl FrameSampler {
    pub fn new(crop_config: CropConfig) -> Self {
        Self {
            crop_config,
            offscreen: RgbaImage::new(0, 0),
            display: RgbaImage::new(0, 0),
        }
    }

    /// Sample the sink. Returns `None` when no frame is available yet.
    pub fn sample(&mut self, sink: &VideoSink) -> Option<SampledFrame> {
        let dimensions = sink.dimensions()?;

        if self.offscreen.dimensions() != (dimensions.width, dimensions.height) {
            log::debug!(
                "allocating offscreen buffer {}x{}",
                dimensions.width,
                dimensions.height
            );
            self.offscreen = RgbaImage::new(dimensions.width, dimensions.height);
        }
        if !sink.draw_frame(&mut self.offscreen) {
            return None;
        }

        let crop = compute_crop_box(dimensions, &self.crop_config);
        let region = PixelRegion::from_crop(&crop, dimensions);
        self.display = imageops::crop_imm(
            &self.offscreen,
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();

        Some(SampledFrame {
            dimensions,
            crop,
            region,
        })
    }

    /// Cropped pixels of the most recent sample.
    pub fn display_buffer(&self) -> &RgbaImage {
        &self.display
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
