//! Scanning session lifecycle.
//!
//! `SessionController` owns the camera stream and the repeating tick for one scanner.
//! The lifecycle is `Idle -> Active -> Stopped`; `Stopped` is also reachable from
//! `Idle`, including while a `start` is still waiting on the camera.
//!
//! Teardown is scoped: an acquired stream lives in a `StreamLease` that releases it
//! exactly once, whether the session ends through `stop`, a start that lost the race
//! against `stop`, or the controller being dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::ScannerConfig;
use crate::decode::{BarcodeDecoder, DecodeInvoker};
use crate::error::{AcquireError, ScanError};
use crate::frame::FrameSampler;
use crate::geometry::{CropConfig, FrameDimensions};
use crate::ingest::{
    select_constraints, DeviceSelection, MediaSourceProvider, MediaStream, VideoSink,
};
use crate::overlay::OverlayRect;
use crate::state::{ScannerSnapshot, ScannerState, SessionPhase};

enum SessionState {
    /// `pending` holds the generation of a start that is waiting on the camera.
    Idle { pending: Option<u64> },
    Active(ActiveSession),
    Stopped,
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle { .. } => SessionPhase::Idle,
            SessionState::Active(_) => SessionPhase::Active,
            SessionState::Stopped => SessionPhase::Stopped,
        }
    }
}

struct ActiveSession {
    generation: u64,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
    lease: StreamLease,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        // Ticker first so no new tick starts against a released sink.
        self.cancel.cancel();
        self.ticker.abort();
        self.lease.release();
        log::info!("session {} torn down", self.generation);
    }
}

/// An acquired stream together with the sink it is bound to.
struct StreamLease {
    stream: MediaStream,
    sink: Arc<VideoSink>,
    released: bool,
}

impl StreamLease {
    fn new(stream: MediaStream) -> Self {
        Self {
            stream,
            sink: Arc::new(VideoSink::new()),
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.stream.stop_all();
        self.sink.release();
        log::debug!("released stream {}", self.stream.id());
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct SessionController {
    config: ScannerConfig,
    provider: Arc<dyn MediaSourceProvider>,
    decoder: Arc<dyn BarcodeDecoder>,
    state: ScannerState,
    session: Mutex<SessionState>,
    generation: AtomicU64,
}

impl SessionController {
    pub fn new(
        config: ScannerConfig,
        provider: Arc<dyn MediaSourceProvider>,
        decoder: Arc<dyn BarcodeDecoder>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            decoder,
            state: ScannerState::new(),
            session: Mutex::new(SessionState::Idle { pending: None }),
            generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ScannerSnapshot {
        self.state.snapshot()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase()
    }

    /// Acquire the camera and begin ticking.
    ///
    /// Acquisition failures leave the controller `Idle` and are recorded in
    /// `last_error`. If `stop` is called while the camera request is outstanding, the
    /// stream is released as soon as it arrives and `Cancelled` is returned.
    pub async fn start(&self) -> Result<(), ScanError> {
        let generation = {
            let mut session = self.lock();
            if matches!(
                *session,
                SessionState::Active(_) | SessionState::Idle { pending: Some(_) }
            ) {
                return Err(ScanError::AlreadyActive);
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *session = SessionState::Idle {
                pending: Some(generation),
            };
            self.state.update(|s| s.phase = SessionPhase::Idle);
            generation
        };
        log::info!(
            "session {}: starting with {} provider",
            generation,
            self.provider.name()
        );

        if let Err(err) = self.decoder.warm_up() {
            log::warn!("decoder '{}' warm-up failed: {}", self.decoder.name(), err);
        }

        let stream = match self.acquire().await {
            Ok(stream) => stream,
            Err(err) => {
                log::warn!("session {}: camera acquisition failed: {}", generation, err);
                if self.clear_pending(generation) {
                    self.state
                        .update(|s| s.last_error = Some(err.user_message()));
                }
                return Err(err.into());
            }
        };
        let lease = StreamLease::new(stream);

        let mut session = self.lock();
        if !is_pending(&session, generation) {
            drop(session);
            log::info!(
                "session {}: stopped before the camera became available, releasing stream",
                generation
            );
            drop(lease);
            return Err(ScanError::Cancelled);
        }

        if !lease.sink.bind(&lease.stream) {
            *session = SessionState::Idle { pending: None };
            drop(session);
            drop(lease);
            let err = AcquireError::Unavailable("stream has no video track".to_string());
            self.state.update(|s| s.last_error = Some(err.user_message()));
            return Err(err.into());
        }

        // Reset before the ticker exists so its first writes land on the new snapshot.
        self.state.update(|s| {
            *s = ScannerSnapshot {
                phase: SessionPhase::Active,
                scanning_active: true,
                ..ScannerSnapshot::default()
            };
        });

        let cancel = CancellationToken::new();
        let invoker = DecodeInvoker::new(
            self.decoder.clone(),
            self.config.not_found,
            self.config.scheduling,
            self.state.clone(),
            cancel.clone(),
        );
        let ticker = tokio::spawn(run_ticker(TickerContext {
            sink: lease.sink.clone(),
            crop: self.config.crop,
            tick_interval: self.config.tick_interval,
            metadata_poll: self.config.metadata_poll,
            invoker,
            state: self.state.clone(),
            cancel: cancel.clone(),
        }));
        *session = SessionState::Active(ActiveSession {
            generation,
            cancel,
            ticker,
            lease,
        });
        log::info!(
            "session {}: active, ticking every {:?} ({} decode scheduling)",
            generation,
            self.config.tick_interval,
            self.config.scheduling
        );
        Ok(())
    }

    /// Stop the session. Safe to call in any phase and any number of times.
    pub fn stop(&self) {
        let previous = {
            let mut session = self.lock();
            let previous = std::mem::replace(&mut *session, SessionState::Stopped);
            if let SessionState::Active(active) = &previous {
                active.cancel.cancel();
            }
            self.state.update_if(|s| {
                let changed = s.phase != SessionPhase::Stopped
                    || s.scanning_active
                    || s.last_decoded_text.is_some()
                    || s.overlay_rect.is_some();
                s.phase = SessionPhase::Stopped;
                s.scanning_active = false;
                s.last_decoded_text = None;
                s.overlay_rect = None;
                changed
            });
            previous
        };
        match &previous {
            SessionState::Active(active) => {
                log::info!("session {}: stopping", active.generation)
            }
            SessionState::Idle {
                pending: Some(generation),
            } => log::info!("session {}: start abandoned", generation),
            SessionState::Idle { pending: None } => log::debug!("stop requested before start"),
            SessionState::Stopped => log::debug!("stop requested while already stopped"),
        }
        drop(previous);
    }

    async fn acquire(&self) -> Result<MediaStream, AcquireError> {
        let devices = match self.config.device_selection {
            DeviceSelection::Enumerate => self.provider.list_devices().await?,
            DeviceSelection::FacingOnly => Vec::new(),
        };
        let constraints = select_constraints(
            self.config.device_selection,
            &devices,
            self.config.device_id.as_deref(),
            self.config.facing,
        )?;
        log::info!("requesting camera with {}", constraints);
        self.provider.acquire_stream(constraints).await
    }

    /// Revert a failed start. Returns false when a stop already superseded it.
    fn clear_pending(&self, generation: u64) -> bool {
        let mut session = self.lock();
        if is_pending(&session, generation) {
            *session = SessionState::Idle { pending: None };
            true
        } else {
            false
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_pending(session: &SessionState, generation: u64) -> bool {
    matches!(session, SessionState::Idle { pending: Some(g) } if *g == generation)
}

struct TickerContext {
    sink: Arc<VideoSink>,
    crop: CropConfig,
    tick_interval: Duration,
    metadata_poll: Duration,
    invoker: DecodeInvoker,
    state: ScannerState,
    cancel: CancellationToken,
}

async fn run_ticker(ctx: TickerContext) {
    let dimensions = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return,
        dimensions = wait_for_dimensions(&ctx.sink, ctx.metadata_poll) => dimensions,
    };
    log::info!(
        "frame dimensions established: {}x{}",
        dimensions.width,
        dimensions.height
    );
    ctx.state.update_if(|s| {
        if ctx.cancel.is_cancelled() {
            return false;
        }
        s.frame = Some(dimensions);
        true
    });

    let mut sampler = FrameSampler::new(ctx.crop);
    let mut interval = tokio::time::interval(ctx.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let Some(sample) = sampler.sample(&ctx.sink) else {
            log::trace!("no frame available this tick");
            continue;
        };
        tick += 1;
        let overlay = OverlayRect::from_crop(&sample.crop, sample.dimensions);
        let submitted = ctx
            .invoker
            .submit(tick, sampler.display_buffer().clone())
            .is_some();

        ctx.state.update_if(|s| {
            if ctx.cancel.is_cancelled() {
                return false;
            }
            s.overlay_rect = Some(overlay);
            s.ticks = tick;
            if submitted {
                s.decodes_submitted += 1;
            }
            true
        });
    }
    log::debug!("ticker exiting after {} tick(s)", tick);
}

/// Poll the sink until it reports frame metadata.
async fn wait_for_dimensions(sink: &VideoSink, poll: Duration) -> FrameDimensions {
    loop {
        if let Some(dimensions) = sink.dimensions() {
            return dimensions;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FacingMode, StreamConstraints, SyntheticConfig, SyntheticProvider};

    #[tokio::test]
    async fn lease_releases_once() {
        let provider = SyntheticProvider::new(SyntheticConfig::default());
        let stream = provider
            .acquire_stream(StreamConstraints::Facing(FacingMode::Environment))
            .await
            .unwrap();
        let mut lease = StreamLease::new(stream);
        assert!(lease.sink.bind(&lease.stream));
        lease.release();
        lease.release();
        assert!(!lease.sink.is_bound());
        drop(lease);
        assert_eq!(provider.issued_tracks()[0].stop_count(), 1);
    }

    #[tokio::test]
    async fn waits_for_late_metadata() {
        let provider = SyntheticProvider::new(SyntheticConfig {
            metadata_delay_polls: 3,
            width: 640,
            height: 480,
            ..SyntheticConfig::default()
        });
        let stream = provider
            .acquire_stream(StreamConstraints::Facing(FacingMode::Environment))
            .await
            .unwrap();
        let sink = VideoSink::new();
        assert!(sink.bind(&stream));
        assert_eq!(sink.dimensions(), None);
        let dims = wait_for_dimensions(&sink, Duration::from_millis(1)).await;
        assert_eq!((dims.width, dims.height), (640, 480));
    }
}
