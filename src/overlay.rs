//! Overlay synchronisation: the crop box expressed as percentages of the frame.

use serde::Serialize;

use crate::geometry::{CropBox, FrameDimensions};

/// Crop box position and size as percentages (0..=100) of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayRect {
    pub left_pct: f64,
    pub top_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
}

impl OverlayRect {
    pub fn from_crop(crop: &CropBox, frame: FrameDimensions) -> Self {
        let frame_width = f64::from(frame.width);
        let frame_height = f64::from(frame.height);
        Self {
            left_pct: pct(crop.x, frame_width),
            top_pct: pct(crop.y, frame_height),
            width_pct: pct(crop.width, frame_width),
            height_pct: pct(crop.height, frame_height),
        }
    }
}

fn pct(value: f64, extent: f64) -> f64 {
    (value / extent * 100.0).clamp(0.0, 100.0)
}
