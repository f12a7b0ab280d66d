//! Synthetic camera (`stub://`).
//!
//! Produces generated gray frames with optional marker payload painted at the
//! center, so the whole pipeline can run without hardware. The provider can also
//! simulate the awkward parts of real cameras: slow permission prompts, denied
//! permission, devices without identifiers, and frame metadata that arrives late.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::decode::paint_marker;
use crate::error::AcquireError;
use crate::geometry::FrameDimensions;

use super::device::{DeviceDescriptor, FacingMode, StreamConstraints};
use super::provider::MediaSourceProvider;
use super::stream::{MediaStream, VideoTrack};

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL (e.g., "stub://front_camera").
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub devices: Vec<DeviceDescriptor>,
    /// Text painted as a marker symbol in every frame.
    pub payload: Option<String>,
    /// Number of dimension queries answered with `None` before metadata appears.
    pub metadata_delay_polls: u32,
    /// Simulated permission prompt latency.
    pub acquire_delay: Duration,
    pub deny_permission: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 1280,
            height: 720,
            devices: vec![DeviceDescriptor {
                id: Some("stub-camera-0".to_string()),
                label: "Synthetic camera".to_string(),
                facing: Some(FacingMode::Environment),
            }],
            payload: None,
            metadata_delay_polls: 0,
            acquire_delay: Duration::ZERO,
            deny_permission: false,
        }
    }
}

pub struct SyntheticProvider {
    config: SyntheticConfig,
    payload: Arc<Mutex<Option<String>>>,
    issued: Mutex<Vec<Arc<SyntheticTrack>>>,
    stream_count: AtomicU64,
}

impl SyntheticProvider {
    pub fn new(config: SyntheticConfig) -> Self {
        let payload = Arc::new(Mutex::new(config.payload.clone()));
        Self {
            config,
            payload,
            issued: Mutex::new(Vec::new()),
            stream_count: AtomicU64::new(0),
        }
    }

    /// Change what the camera "sees" from the next frame on.
    pub fn set_payload(&self, payload: Option<&str>) {
        *lock(&self.payload) = payload.map(str::to_string);
    }

    /// Every track handed out so far, in acquisition order.
    pub fn issued_tracks(&self) -> Vec<Arc<SyntheticTrack>> {
        lock(&self.issued).clone()
    }

    fn open_track(&self, constraints: &StreamConstraints) -> Result<MediaStream, AcquireError> {
        if self.config.deny_permission {
            return Err(AcquireError::PermissionDenied);
        }
        let label = match constraints {
            StreamConstraints::Device(id) => self
                .config
                .devices
                .iter()
                .find(|d| d.id.as_deref() == Some(id.as_str()))
                .map(|d| d.label.clone())
                .ok_or(AcquireError::NoDeviceFound)?,
            StreamConstraints::Facing(_) => self
                .config
                .devices
                .first()
                .map(|d| d.label.clone())
                .unwrap_or_else(|| "Synthetic camera".to_string()),
        };
        let dimensions = FrameDimensions::new(self.config.width, self.config.height)
            .ok_or_else(|| AcquireError::Unavailable("synthetic frame size is zero".into()))?;

        let track = Arc::new(SyntheticTrack {
            label,
            dimensions,
            polls_remaining: AtomicU32::new(self.config.metadata_delay_polls),
            live: AtomicBool::new(true),
            stops: AtomicU32::new(0),
            frames: AtomicU64::new(0),
            payload: self.payload.clone(),
        });
        lock(&self.issued).push(track.clone());

        let n = self.stream_count.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "SyntheticProvider: opened {} with {} ({}x{})",
            self.config.url,
            constraints,
            self.config.width,
            self.config.height
        );
        Ok(MediaStream::new(
            format!("synthetic-{n}"),
            vec![track as Arc<dyn VideoTrack>],
        ))
    }
}

#[async_trait]
impl MediaSourceProvider for SyntheticProvider {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, AcquireError> {
        Ok(self.config.devices.clone())
    }

    async fn acquire_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<MediaStream, AcquireError> {
        if !self.config.acquire_delay.is_zero() {
            tokio::time::sleep(self.config.acquire_delay).await;
        }
        self.open_track(&constraints)
    }
}

pub struct SyntheticTrack {
    label: String,
    dimensions: FrameDimensions,
    polls_remaining: AtomicU32,
    live: AtomicBool,
    stops: AtomicU32,
    frames: AtomicU64,
    payload: Arc<Mutex<Option<String>>>,
}

impl SyntheticTrack {
    /// How many times `stop` was called.
    pub fn stop_count(&self) -> u32 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }
}

impl VideoTrack for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> Option<FrameDimensions> {
        let waiting = self
            .polls_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if waiting {
            None
        } else {
            Some(self.dimensions)
        }
    }

    fn draw_frame(&self, target: &mut RgbaImage) -> bool {
        if target.dimensions() != (self.dimensions.width, self.dimensions.height) {
            return false;
        }
        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        // sensor noise, constant per frame
        let noise = rand::random::<u8>() % 8;
        for (x, y, pixel) in target.enumerate_pixels_mut() {
            let v = ((u64::from(x / 4) + u64::from(y / 4) + frame) % 200) as u8 + noise;
            *pixel = Rgba([v, v, v, 255]);
        }
        if let Some(text) = lock(&self.payload).as_deref() {
            if !paint_marker(target, text) {
                log::warn!("synthetic payload does not fit in {}x{}", target.width(), target.height());
            }
        }
        true
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
