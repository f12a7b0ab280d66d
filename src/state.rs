//! Observable scanner state.
//!
//! This is the presentation boundary: a UI layer subscribes to `ScannerSnapshot`
//! updates and issues `start`/`stop` on the session controller. Nothing else leaves
//! the core.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::geometry::FrameDimensions;
use crate::overlay::OverlayRect;

/// Lifecycle phase of the current session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Active,
    Stopped,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScannerSnapshot {
    pub phase: SessionPhase,
    pub scanning_active: bool,
    pub last_decoded_text: Option<String>,
    pub last_error: Option<String>,
    pub overlay_rect: Option<OverlayRect>,
    /// Established once per active session.
    pub frame: Option<FrameDimensions>,
    /// Sampling cycles that produced a crop.
    pub ticks: u64,
    pub decodes_submitted: u64,
}

/// Shared writer side of the snapshot channel.
#[derive(Clone)]
pub struct ScannerState {
    tx: Arc<watch::Sender<ScannerSnapshot>>,
}

impl ScannerState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ScannerSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScannerSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ScannerSnapshot {
        self.tx.borrow().clone()
    }

    pub fn update(&self, apply: impl FnOnce(&mut ScannerSnapshot)) {
        self.tx.send_modify(apply);
    }

    /// Apply `apply` and notify subscribers only when it reports a change.
    ///
    /// The closure runs under the channel lock, so checks made inside it are
    /// atomic with respect to other updates.
    pub fn update_if(&self, apply: impl FnOnce(&mut ScannerSnapshot) -> bool) -> bool {
        self.tx.send_if_modified(apply)
    }
}

impl Default for ScannerState {
    fn default() -> Self {
        Self::new()
    }
}
