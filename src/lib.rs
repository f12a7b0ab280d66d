//! Crop-box barcode scanner
//!
//! This crate implements the core of a live camera barcode scanner: it samples a
//! centered crop box out of every camera frame on a fixed tick, feeds the crop to a
//! pluggable decoder, and publishes what the UI needs to draw.
//!
//! # Architecture
//!
//! One tick runs:
//!
//! 1. **Geometry**: compute the crop box for the current frame size.
//! 2. **Sampling**: copy the crop out of the latest frame into a display buffer.
//! 3. **Overlay**: express the crop box as frame percentages (synchronous).
//! 4. **Decode**: hand the display buffer to the decoder (asynchronous, may outlive
//!    the tick).
//!
//! The session controller owns the camera stream and the tick for the whole
//! `Idle -> Active -> Stopped` lifecycle and guarantees the stream is released
//! exactly once.
//!
//! # Module Structure
//!
//! - `geometry`: crop box computation
//! - `frame`: per-tick sampling (offscreen and display buffers)
//! - `overlay`: percentage rectangle for the presentation layer
//! - `decode`: decoder capability, registry and invocation policies
//! - `ingest`: camera sources (synthetic, still image, V4L2)
//! - `session`: lifecycle and tick loop
//! - `state`: observable scanner snapshot
//! - `config`: presets, config file and environment overrides

pub mod config;
pub mod decode;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod session;
pub mod state;

pub use config::{Preset, ScannerConfig};
pub use decode::{
    BarcodeDecoder, DecodeInvoker, DecodeOutcome, DecodeScheduling, DecoderRegistry,
    MarkerDecoder, NotFoundPolicy,
};
pub use error::{AcquireError, DecodeError, ScanError};
pub use frame::{FrameSampler, PixelRegion, SampledFrame};
pub use geometry::{compute_crop_box, CropBounds, CropBox, CropConfig, FrameDimensions};
pub use ingest::{
    open_provider, DeviceDescriptor, DeviceSelection, FacingMode, MediaSourceProvider,
    MediaStream, StreamConstraints, SyntheticConfig, SyntheticProvider, VideoSink, VideoTrack,
};
pub use overlay::OverlayRect;
pub use session::SessionController;
pub use state::{ScannerSnapshot, ScannerState, SessionPhase};
