//! V4L2 camera provider.
//!
//! Opens local video devices (e.g. /dev/video0) and captures on a dedicated thread.
//! The latest converted frame is kept in memory for the sampler; nothing else is
//! retained.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image::RgbaImage;

use super::device::{DeviceDescriptor, StreamConstraints};
use super::normalize::{normalize_to_rgba, PixelFormat};
use super::provider::MediaSourceProvider;
use super::stream::{MediaStream, VideoTrack};
use crate::error::AcquireError;
use crate::geometry::FrameDimensions;

const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const CAPTURE_BUFFERS: u32 = 4;

pub struct V4l2Provider {
    /// Device named by the source string, if any.
    device: Option<PathBuf>,
}

impl V4l2Provider {
    /// `source` is `v4l2://` (enumerate), `v4l2:///dev/videoN` or `/dev/videoN`.
    pub fn new(source: &str) -> Self {
        let path = source.strip_prefix("v4l2://").unwrap_or(source);
        Self {
            device: (!path.is_empty()).then(|| PathBuf::from(path)),
        }
    }
}

#[async_trait]
impl MediaSourceProvider for V4l2Provider {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, AcquireError> {
        tokio::task::spawn_blocking(enumerate)
            .await
            .map_err(|e| AcquireError::Unavailable(format!("device enumeration failed: {e}")))
    }

    async fn acquire_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<MediaStream, AcquireError> {
        let configured = self.device.clone();
        tokio::task::spawn_blocking(move || {
            let path = match constraints {
                StreamConstraints::Device(id) => PathBuf::from(id),
                StreamConstraints::Facing(_) => match configured {
                    Some(path) => path,
                    None => enumerate()
                        .into_iter()
                        .find_map(|d| d.id)
                        .map(PathBuf::from)
                        .ok_or(AcquireError::NoDeviceFound)?,
                },
            };
            open_device(path)
        })
        .await
        .map_err(|e| AcquireError::Unavailable(format!("device open failed: {e}")))?
    }
}

fn enumerate() -> Vec<DeviceDescriptor> {
    v4l::context::enum_devices()
        .into_iter()
        .map(|node| {
            let path = node.path().display().to_string();
            DeviceDescriptor {
                label: node.name().unwrap_or_else(|| path.clone()),
                id: Some(path),
                facing: None,
            }
        })
        .collect()
}

fn map_io(err: io::Error) -> AcquireError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => AcquireError::PermissionDenied,
        io::ErrorKind::NotFound => AcquireError::NoDeviceFound,
        _ => AcquireError::Unavailable(err.to_string()),
    }
}

fn open_device(path: PathBuf) -> Result<MediaStream, AcquireError> {
    use v4l::video::Capture;

    let mut device = v4l::Device::with_path(&path).map_err(map_io)?;
    let mut format = device.format().map_err(map_io)?;
    format.width = DEFAULT_WIDTH;
    format.height = DEFAULT_HEIGHT;
    format.fourcc = v4l::FourCC::new(b"YUYV");
    let format = match device.set_format(&format) {
        Ok(format) => format,
        Err(err) => {
            log::warn!("V4l2Provider: failed to set format on {}: {}", path.display(), err);
            device.format().map_err(map_io)?
        }
    };
    let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
        AcquireError::Unavailable(format!("unsupported pixel format {}", format.fourcc))
    })?;

    let label = path.display().to_string();
    let shared = Arc::new(CaptureShared {
        live: AtomicBool::new(true),
        latest: Mutex::new(None),
    });
    let worker = shared.clone();
    let (width, height) = (format.width, format.height);
    let thread_label = label.clone();
    std::thread::Builder::new()
        .name("v4l2-capture".to_string())
        .spawn(move || capture_loop(device, worker, width, height, pixel_format, thread_label))
        .map_err(|e| AcquireError::Unavailable(format!("spawn capture thread: {e}")))?;

    log::info!("V4l2Provider: opened {} ({}x{})", label, width, height);
    let track = Arc::new(V4l2Track { label: label.clone(), shared });
    Ok(MediaStream::new(
        format!("v4l2:{label}"),
        vec![track as Arc<dyn VideoTrack>],
    ))
}

fn capture_loop(
    mut device: v4l::Device,
    shared: Arc<CaptureShared>,
    width: u32,
    height: u32,
    format: PixelFormat,
    label: String,
) {
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;

    let mut stream =
        match v4l::prelude::MmapStream::with_buffers(&mut device, Type::VideoCapture, CAPTURE_BUFFERS)
        {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("V4l2Provider: failed to start stream on {}: {}", label, err);
                shared.live.store(false, Ordering::SeqCst);
                return;
            }
        };

    while shared.live.load(Ordering::SeqCst) {
        let (buf, _meta) = match stream.next() {
            Ok(frame) => frame,
            Err(err) => {
                log::error!("V4l2Provider: capture failed on {}: {}", label, err);
                break;
            }
        };
        match normalize_to_rgba(buf, width, height, format) {
            Ok(frame) => *shared.latest() = Some(frame),
            Err(err) => log::warn!("V4l2Provider: dropped frame from {}: {}", label, err),
        }
    }
    shared.live.store(false, Ordering::SeqCst);
    log::debug!("V4l2Provider: capture thread for {} exiting", label);
}

struct CaptureShared {
    live: AtomicBool,
    latest: Mutex<Option<RgbaImage>>,
}

impl CaptureShared {
    fn latest(&self) -> MutexGuard<'_, Option<RgbaImage>> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct V4l2Track {
    label: String,
    shared: Arc<CaptureShared>,
}

impl VideoTrack for V4l2Track {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Option<FrameDimensions> {
        self.shared
            .latest()
            .as_ref()
            .and_then(|frame| FrameDimensions::new(frame.width(), frame.height()))
    }

    fn draw_frame(&self, target: &mut RgbaImage) -> bool {
        match self.shared.latest().as_ref() {
            Some(frame) if frame.dimensions() == target.dimensions() => {
                target.copy_from_slice(frame.as_raw());
                true
            }
            _ => false,
        }
    }

    fn stop(&self) {
        self.shared.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }
}
