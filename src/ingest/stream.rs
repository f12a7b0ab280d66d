use std::sync::{Arc, Mutex, MutexGuard};

use image::RgbaImage;

use crate::geometry::FrameDimensions;

/// One live video track of an acquired stream.
///
/// Implementations own the device side of the track. `stop` must be safe to call
/// more than once; the session only calls it once per acquisition.
pub trait VideoTrack: Send + Sync {
    fn label(&self) -> &str;

    /// `None` until the track has produced frame metadata.
    fn dimensions(&self) -> Option<FrameDimensions>;

    /// Draw the most recent frame into `target`, which is sized to `dimensions()`.
    /// Returns false when no frame is available at that size.
    fn draw_frame(&self, target: &mut RgbaImage) -> bool;

    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// Handle to an acquired camera stream.
pub struct MediaStream {
    id: String,
    tracks: Vec<Arc<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<dyn VideoTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn VideoTrack>] {
        &self.tracks
    }

    pub fn video_track(&self) -> Option<Arc<dyn VideoTrack>> {
        self.tracks.first().cloned()
    }

    /// Stop every track obtained from this stream.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            log::debug!("stopping track '{}' of stream {}", track.label(), self.id);
            track.stop();
        }
    }
}

/// The element a stream is bound to while a session is active.
///
/// The frame sampler reads through the sink; teardown unbinds it.
#[derive(Default)]
pub struct VideoSink {
    bound: Mutex<Option<Arc<dyn VideoTrack>>>,
}

impl VideoSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the stream's video track. Returns false when the stream has none.
    pub fn bind(&self, stream: &MediaStream) -> bool {
        let track = stream.video_track();
        let bound = track.is_some();
        *self.slot() = track;
        bound
    }

    pub fn release(&self) {
        self.slot().take();
    }

    pub fn is_bound(&self) -> bool {
        self.slot().is_some()
    }

    pub fn dimensions(&self) -> Option<FrameDimensions> {
        self.slot().as_ref().and_then(|track| track.dimensions())
    }

    pub fn draw_frame(&self, target: &mut RgbaImage) -> bool {
        match self.slot().as_ref() {
            Some(track) if track.is_live() => track.draw_frame(target),
            _ => false,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn VideoTrack>>> {
        self.bound
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
