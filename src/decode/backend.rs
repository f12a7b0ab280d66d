use image::RgbaImage;

use crate::error::DecodeError;

/// Barcode decoder capability.
///
/// The decoding algorithm is opaque to the pipeline: it receives the cropped
/// display buffer and reports a payload, "nothing here" (`Ok(None)`), or a failure.
///
/// Decoders are shared across overlapping decode calls, hence `&self` and `Sync`.
/// Implementations must treat the image as read-only and must not retain it.
pub trait BarcodeDecoder: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Decode one image. May be slow; callers run it off the tick path.
    fn decode(&self, image: &RgbaImage) -> Result<Option<String>, DecodeError>;

    /// Optional warm-up hook, invoked once per session start.
    fn warm_up(&self) -> Result<(), DecodeError> {
        Ok(())
    }
}
