use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use cropscan::{
    AcquireError, DeviceDescriptor, MarkerDecoder, MediaSourceProvider, MediaStream, Preset,
    ScanError, ScannerConfig, ScannerSnapshot, SessionController, SessionPhase,
    StreamConstraints, SyntheticConfig, SyntheticProvider,
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(preset: Preset) -> ScannerConfig {
    ScannerConfig {
        tick_interval: Duration::from_millis(10),
        metadata_poll: Duration::from_millis(2),
        ..ScannerConfig::for_preset(preset)
    }
}

fn camera(payload: Option<&str>) -> SyntheticConfig {
    SyntheticConfig {
        width: 640,
        height: 480,
        payload: payload.map(str::to_string),
        ..SyntheticConfig::default()
    }
}

fn controller(
    config: ScannerConfig,
    provider: Arc<dyn MediaSourceProvider>,
) -> SessionController {
    SessionController::new(config, provider, Arc::new(MarkerDecoder::new()))
        .expect("valid config")
}

async fn wait_until(
    rx: &mut watch::Receiver<ScannerSnapshot>,
    what: &str,
    predicate: impl FnMut(&ScannerSnapshot) -> bool,
) -> ScannerSnapshot {
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .expect("state channel closed")
        .clone();
    snapshot
}

/// Holds every camera request until the test opens the gate.
struct GatedProvider {
    inner: SyntheticProvider,
    entered: AtomicBool,
    gate: Notify,
}

impl GatedProvider {
    fn new(config: SyntheticConfig) -> Self {
        Self {
            inner: SyntheticProvider::new(config),
            entered: AtomicBool::new(false),
            gate: Notify::new(),
        }
    }
}

#[async_trait]
impl MediaSourceProvider for GatedProvider {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, AcquireError> {
        self.inner.list_devices().await
    }

    async fn acquire_stream(
        &self,
        constraints: StreamConstraints,
    ) -> Result<MediaStream, AcquireError> {
        self.entered.store(true, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.acquire_stream(constraints).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_then_stop_releases_stream_once() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    let mut rx = controller.subscribe();

    controller.start().await.expect("start");
    assert_eq!(controller.phase(), SessionPhase::Active);

    let snapshot = wait_until(&mut rx, "first ticks", |s| s.ticks >= 3).await;
    assert!(snapshot.scanning_active);
    assert_eq!(snapshot.frame.map(|f| (f.width, f.height)), Some((640, 480)));
    let overlay = snapshot.overlay_rect.expect("overlay after a tick");
    assert!((overlay.left_pct * 2.0 + overlay.width_pct - 100.0).abs() < 1e-9);
    assert!(snapshot.decodes_submitted >= 1);

    controller.stop();
    controller.stop();

    let tracks = provider.issued_tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].stop_count(), 1);

    let snapshot = controller.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Stopped);
    assert!(!snapshot.scanning_active);
    assert_eq!(snapshot.overlay_rect, None);
    assert_eq!(controller.phase(), SessionPhase::Stopped);

    // the ticker is gone: counters stay put
    let ticks = snapshot.ticks;
    let frames = tracks[0].frames_drawn();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(controller.snapshot().ticks, ticks);
    assert_eq!(tracks[0].frames_drawn(), frames);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_before_camera_resolves_releases_late_stream() {
    let provider = Arc::new(GatedProvider::new(camera(None)));
    let controller = Arc::new(controller(fast_config(Preset::Cropper), provider.clone()));

    let starter = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start().await })
    };
    tokio::time::timeout(WAIT, async {
        while !provider.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("camera request issued");

    controller.stop();
    assert_eq!(controller.phase(), SessionPhase::Stopped);

    provider.gate.notify_one();
    let result = starter.await.expect("start task");
    assert!(matches!(result, Err(ScanError::Cancelled)));

    let tracks = provider.inner.issued_tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].stop_count(), 1);
    assert_eq!(controller.phase(), SessionPhase::Stopped);
    assert!(!controller.snapshot().scanning_active);
}

#[tokio::test]
async fn stop_without_start_is_a_noop() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    controller.stop();
    controller.stop();
    assert_eq!(controller.phase(), SessionPhase::Stopped);
    assert!(provider.issued_tracks().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn decodes_payload_end_to_end() {
    let provider = Arc::new(SyntheticProvider::new(camera(Some("4006381333931"))));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    let mut rx = controller.subscribe();

    controller.start().await.expect("start");
    let snapshot = wait_until(&mut rx, "decoded text", |s| {
        s.last_decoded_text.is_some()
    })
    .await;
    assert_eq!(snapshot.last_decoded_text.as_deref(), Some("4006381333931"));
    assert_eq!(snapshot.last_error, None);

    // the cropper preset keeps the last hit when the code leaves the frame
    provider.set_payload(None);
    let seen = controller.snapshot().ticks;
    wait_until(&mut rx, "more ticks", |s| s.ticks >= seen + 5).await;
    assert_eq!(
        controller.snapshot().last_decoded_text.as_deref(),
        Some("4006381333931")
    );

    controller.stop();
    assert_eq!(controller.snapshot().last_decoded_text, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn continuous_preset_clears_on_miss() {
    let provider = Arc::new(SyntheticProvider::new(camera(Some("CONT-1"))));
    let controller = controller(fast_config(Preset::Continuous), provider.clone());
    let mut rx = controller.subscribe();

    controller.start().await.expect("start");
    wait_until(&mut rx, "decoded text", |s| {
        s.last_decoded_text.as_deref() == Some("CONT-1")
    })
    .await;

    provider.set_payload(None);
    wait_until(&mut rx, "cleared text", |s| s.last_decoded_text.is_none()).await;
    assert!(controller.snapshot().scanning_active);
    controller.stop();
}

#[tokio::test]
async fn permission_denied_stays_idle() {
    let provider = Arc::new(SyntheticProvider::new(SyntheticConfig {
        deny_permission: true,
        ..camera(None)
    }));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());

    let err = controller.start().await.err().expect("start must fail");
    assert!(matches!(
        err,
        ScanError::Acquire(AcquireError::PermissionDenied)
    ));
    assert_eq!(controller.phase(), SessionPhase::Idle);

    let snapshot = controller.snapshot();
    assert!(!snapshot.scanning_active);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Unable to access the camera. Please check permissions.")
    );
    assert!(provider.issued_tracks().is_empty());
}

#[tokio::test]
async fn enumeration_without_devices_is_no_device_found() {
    let provider = Arc::new(SyntheticProvider::new(SyntheticConfig {
        devices: Vec::new(),
        ..camera(None)
    }));
    let controller = controller(fast_config(Preset::Continuous), provider);

    let err = controller.start().await.err().expect("start must fail");
    assert!(matches!(err, ScanError::Acquire(AcquireError::NoDeviceFound)));
    assert_eq!(controller.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn devices_without_ids_fall_back_to_facing() {
    let provider = Arc::new(SyntheticProvider::new(SyntheticConfig {
        devices: vec![DeviceDescriptor {
            id: None,
            label: "anonymous camera".to_string(),
            facing: None,
        }],
        ..camera(None)
    }));
    let controller = controller(fast_config(Preset::Continuous), provider.clone());

    controller.start().await.expect("start");
    assert_eq!(controller.phase(), SessionPhase::Active);
    controller.stop();
    assert_eq!(provider.issued_tracks()[0].stop_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_start_while_active_is_rejected() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());

    controller.start().await.expect("start");
    assert!(matches!(
        controller.start().await,
        Err(ScanError::AlreadyActive)
    ));
    assert_eq!(provider.issued_tracks().len(), 1);
    controller.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_after_stop_opens_a_fresh_stream() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    let mut rx = controller.subscribe();

    controller.start().await.expect("first start");
    wait_until(&mut rx, "first session ticks", |s| s.ticks >= 1).await;
    controller.stop();

    controller.start().await.expect("second start");
    let snapshot = wait_until(&mut rx, "second session ticks", |s| {
        s.phase == SessionPhase::Active && s.ticks >= 1
    })
    .await;
    assert!(snapshot.scanning_active);

    let tracks = provider.issued_tracks();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].stop_count(), 1);
    assert_eq!(tracks[1].stop_count(), 0);
    controller.stop();
    assert_eq!(tracks[1].stop_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn frame_dimensions_survive_session_start() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    let mut rx = controller.subscribe();

    for round in 0..100 {
        controller.start().await.expect("start");
        let snapshot = wait_until(&mut rx, "ticks after start", |s| {
            s.scanning_active && s.ticks >= 1
        })
        .await;
        assert_eq!(
            snapshot.frame.map(|f| (f.width, f.height)),
            Some((640, 480)),
            "round {round} ticked without frame dimensions"
        );
        controller.stop();
    }
    assert!(provider.issued_tracks().iter().all(|t| t.stop_count() == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_stop_leaves_published_phase_consistent() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));

    for round in 0..100 {
        let controller = Arc::new(controller(fast_config(Preset::Cropper), provider.clone()));
        let starter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start().await })
        };
        let stopper = {
            let controller = controller.clone();
            tokio::task::spawn_blocking(move || controller.stop())
        };
        let started = starter.await.unwrap();
        stopper.await.unwrap();

        let phase = controller.phase();
        assert_eq!(controller.snapshot().phase, phase, "round {round}");
        if let Err(err) = started {
            assert!(matches!(err, ScanError::Cancelled), "round {round}: {err}");
            assert_eq!(phase, SessionPhase::Stopped, "round {round}");
        }
        controller.stop();
    }
    assert!(provider.issued_tracks().iter().all(|t| t.stop_count() == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_metadata_delays_first_tick() {
    let provider = Arc::new(SyntheticProvider::new(SyntheticConfig {
        metadata_delay_polls: 25,
        ..camera(None)
    }));
    let controller = controller(fast_config(Preset::Cropper), provider);
    let mut rx = controller.subscribe();

    controller.start().await.expect("start");
    assert_eq!(controller.snapshot().frame, None);
    let snapshot = wait_until(&mut rx, "frame dimensions", |s| s.ticks >= 1).await;
    assert_eq!(snapshot.frame.map(|f| (f.width, f.height)), Some((640, 480)));
    controller.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_controller_releases_stream() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let controller = controller(fast_config(Preset::Cropper), provider.clone());
    controller.start().await.expect("start");
    drop(controller);

    let tracks = provider.issued_tracks();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].stop_count(), 1);
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let provider = Arc::new(SyntheticProvider::new(camera(None)));
    let mut config = fast_config(Preset::Cropper);
    config.crop.size_factor = 0.0;
    assert!(SessionController::new(config, provider, Arc::new(MarkerDecoder::new())).is_err());
}
