//! Crop-box geometry.
//!
//! Computes the centered sub-region of a camera frame that is handed to the decoder.
//! The box is sized from the frame and a `CropConfig`, in this order:
//!
//! 1. Derive the box at the configured aspect ratio (height-first when the frame is
//!    proportionally wider than the target, width-first otherwise).
//! 2. Clamp each axis to the frame.
//! 3. Clamp each axis into the absolute `CropBounds`, when configured.
//! 4. Clamp each axis to the frame again, so a lower bound larger than the frame
//!    can never push the box past the frame edge.
//! 5. Center the box.
//!
//! Steps 3 and 4 may break the exact aspect ratio. That is accepted: bounds win.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Size of the source camera frame in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    /// Returns `None` when either axis is zero (no usable frame yet).
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    pub fn ratio(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

/// Absolute pixel bounds for the crop box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropBounds {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

/// Crop configuration, fixed for the lifetime of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropConfig {
    /// Target width / height ratio.
    pub aspect_ratio: f64,
    /// Fraction of the constraining frame axis covered by the box, in (0, 1].
    pub size_factor: f64,
    #[serde(default)]
    pub bounds: Option<CropBounds>,
}

impl CropConfig {
    pub fn new(aspect_ratio: f64, size_factor: f64) -> Self {
        Self {
            aspect_ratio,
            size_factor,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, bounds: CropBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.aspect_ratio.is_finite() || self.aspect_ratio <= 0.0 {
            return Err(anyhow!(
                "crop aspect ratio must be a positive number (got {})",
                self.aspect_ratio
            ));
        }
        if !self.size_factor.is_finite() || self.size_factor <= 0.0 || self.size_factor > 1.0 {
            return Err(anyhow!(
                "crop size factor must be in (0, 1] (got {})",
                self.size_factor
            ));
        }
        if let Some(bounds) = &self.bounds {
            if bounds.min_width == 0 || bounds.min_height == 0 {
                return Err(anyhow!("crop bounds must be positive"));
            }
            if bounds.min_width > bounds.max_width {
                return Err(anyhow!(
                    "crop min_width {} exceeds max_width {}",
                    bounds.min_width,
                    bounds.max_width
                ));
            }
            if bounds.min_height > bounds.max_height {
                return Err(anyhow!(
                    "crop min_height {} exceeds max_height {}",
                    bounds.min_height,
                    bounds.max_height
                ));
            }
        }
        Ok(())
    }
}

/// Crop region in source-frame pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CropBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Compute the crop box for a frame. Pure and total.
pub fn compute_crop_box(frame: FrameDimensions, config: &CropConfig) -> CropBox {
    let frame_width = f64::from(frame.width);
    let frame_height = f64::from(frame.height);

    let (mut width, mut height) = if frame.ratio() / config.aspect_ratio > 1.0 {
        let height = frame_height * config.size_factor;
        (height * config.aspect_ratio, height)
    } else {
        let width = frame_width * config.size_factor;
        (width, width / config.aspect_ratio)
    };

    width = width.min(frame_width);
    height = height.min(frame_height);

    if let Some(bounds) = &config.bounds {
        // min wins over max when the bounds are inverted
        width = width
            .min(f64::from(bounds.max_width))
            .max(f64::from(bounds.min_width));
        height = height
            .min(f64::from(bounds.max_height))
            .max(f64::from(bounds.min_height));
        width = width.min(frame_width);
        height = height.min(frame_height);
    }

    CropBox {
        x: (frame_width - width) / 2.0,
        y: (frame_height - height) / 2.0,
        width,
        height,
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
