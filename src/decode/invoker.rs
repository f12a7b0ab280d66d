//! Decode invocation.
//!
//! Each tick hands its display buffer to `DecodeInvoker::submit`. Decoding runs on the
//! blocking pool and may outlive the tick. How overlapping calls are reconciled is an
//! explicit choice (`DecodeScheduling`), as is what a miss does to the displayed text
//! (`NotFoundPolicy`).
//!
//! Every outcome is checked against the session's cancellation token before it is
//! applied; outcomes that resolve after the session stopped are dropped.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::DecodeError;
use crate::state::ScannerState;

use super::backend::BarcodeDecoder;
use super::outcome::DecodeOutcome;

/// What a `NotFound` outcome does to the displayed result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Keep showing the last successful decode.
    #[default]
    PreserveLast,
    /// Clear the displayed text on every miss.
    ClearOnMiss,
}

impl FromStr for NotFoundPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "preserve" | "preserve_last" => Ok(NotFoundPolicy::PreserveLast),
            "clear" | "clear_on_miss" => Ok(NotFoundPolicy::ClearOnMiss),
            other => Err(anyhow!("unknown not-found policy '{}'", other)),
        }
    }
}

/// How overlapping decode calls are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeScheduling {
    /// Decodes may overlap; an outcome applies only if its tick is newer than the
    /// last applied one.
    #[default]
    LatestTick,
    /// At most one decode in flight; ticks arriving meanwhile skip decoding.
    Serialized,
}

impl FromStr for DecodeScheduling {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest" | "latest_tick" => Ok(DecodeScheduling::LatestTick),
            "serialized" | "serial" => Ok(DecodeScheduling::Serialized),
            other => Err(anyhow!("unknown decode scheduling '{}'", other)),
        }
    }
}

impl fmt::Display for DecodeScheduling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeScheduling::LatestTick => f.write_str("latest_tick"),
            DecodeScheduling::Serialized => f.write_str("serialized"),
        }
    }
}

/// Submits display buffers to the decoder and folds outcomes into scanner state.
#[derive(Clone)]
pub struct DecodeInvoker {
    decoder: Arc<dyn BarcodeDecoder>,
    not_found: NotFoundPolicy,
    scheduling: DecodeScheduling,
    state: ScannerState,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    last_applied: Arc<Mutex<Option<u64>>>,
}

impl DecodeInvoker {
    pub fn new(
        decoder: Arc<dyn BarcodeDecoder>,
        not_found: NotFoundPolicy,
        scheduling: DecodeScheduling,
        state: ScannerState,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            decoder,
            not_found,
            scheduling,
            state,
            cancel,
            in_flight: Arc::new(AtomicUsize::new(0)),
            last_applied: Arc::new(Mutex::new(None)),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submit the display buffer of tick `tick`.
    ///
    /// Returns `None` when nothing was submitted: the session is gone, or a decode is
    /// already in flight under `Serialized`.
    pub fn submit(&self, tick: u64, image: RgbaImage) -> Option<JoinHandle<()>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if self.scheduling == DecodeScheduling::Serialized
            && self
                .in_flight
                .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            log::trace!("tick {}: decode still in flight, skipping", tick);
            return None;
        }
        if self.scheduling == DecodeScheduling::LatestTick {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }

        let invoker = self.clone();
        Some(tokio::spawn(async move {
            let decoder = invoker.decoder.clone();
            let outcome = match tokio::task::spawn_blocking(move || decoder.decode(&image)).await
            {
                Ok(result) => DecodeOutcome::from(result),
                Err(err) => {
                    DecodeOutcome::Error(DecodeError::Backend(format!("decode worker failed: {err}")))
                }
            };
            invoker.resolve(tick, outcome);
        }))
    }

    /// Apply the outcome of tick `tick`. Returns true when it changed visible state.
    pub fn resolve(&self, tick: u64, outcome: DecodeOutcome) -> bool {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        if let DecodeOutcome::Error(err) = &outcome {
            log::error!("decode failed on tick {}: {}", tick, err);
        }

        self.state.update_if(|snapshot| {
            if self.cancel.is_cancelled() {
                log::debug!("tick {}: session stopped, discarding decode outcome", tick);
                return false;
            }
            if self.scheduling == DecodeScheduling::LatestTick && !self.claim(tick) {
                log::debug!("tick {}: newer outcome already applied, discarding", tick);
                return false;
            }
            match outcome {
                DecodeOutcome::Found(text) => {
                    log::info!("decoded barcode: {}", text);
                    let changed = snapshot.last_decoded_text.as_deref() != Some(text.as_str())
                        || snapshot.last_error.is_some();
                    snapshot.last_decoded_text = Some(text);
                    snapshot.last_error = None;
                    changed
                }
                DecodeOutcome::NotFound => match self.not_found {
                    NotFoundPolicy::PreserveLast => false,
                    NotFoundPolicy::ClearOnMiss => snapshot.last_decoded_text.take().is_some(),
                },
                DecodeOutcome::Error(err) => {
                    snapshot.last_error = Some(err.to_string());
                    true
                }
            }
        })
    }

    fn claim(&self, tick: u64) -> bool {
        let mut last = self
            .last_applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *last {
            Some(applied) if applied >= tick => false,
            _ => {
                *last = Some(tick);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Option<&'static str>);

    impl BarcodeDecoder for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn decode(&self, _image: &RgbaImage) -> Result<Option<String>, DecodeError> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn invoker(policy: NotFoundPolicy, scheduling: DecodeScheduling) -> (DecodeInvoker, ScannerState) {
        let state = ScannerState::new();
        let invoker = DecodeInvoker::new(
            Arc::new(Fixed(Some("0123456789"))),
            policy,
            scheduling,
            state.clone(),
            CancellationToken::new(),
        );
        (invoker, state)
    }

    fn found(text: &str) -> DecodeOutcome {
        DecodeOutcome::Found(text.to_string())
    }

    #[test]
    fn not_found_preserves_last_result() {
        let (invoker, state) = invoker(NotFoundPolicy::PreserveLast, DecodeScheduling::LatestTick);
        invoker.resolve(1, found("ABC-123"));
        invoker.resolve(2, DecodeOutcome::NotFound);
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("ABC-123"));
    }

    #[test]
    fn not_found_clears_on_miss() {
        let (invoker, state) = invoker(NotFoundPolicy::ClearOnMiss, DecodeScheduling::LatestTick);
        invoker.resolve(1, found("ABC-123"));
        assert!(invoker.resolve(2, DecodeOutcome::NotFound));
        assert_eq!(state.snapshot().last_decoded_text, None);
    }

    #[test]
    fn stale_tick_outcomes_are_discarded() {
        let (invoker, state) = invoker(NotFoundPolicy::PreserveLast, DecodeScheduling::LatestTick);
        // tick 2 was submitted last but resolves first
        assert!(invoker.resolve(2, found("newer")));
        assert!(!invoker.resolve(1, found("older")));
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("newer"));
    }

    #[test]
    fn stale_miss_does_not_clear_newer_hit() {
        let (invoker, state) = invoker(NotFoundPolicy::ClearOnMiss, DecodeScheduling::LatestTick);
        invoker.resolve(5, found("fresh"));
        assert!(!invoker.resolve(4, DecodeOutcome::NotFound));
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("fresh"));
    }

    #[test]
    fn errors_are_reported_without_touching_text() {
        let (invoker, state) = invoker(NotFoundPolicy::ClearOnMiss, DecodeScheduling::LatestTick);
        invoker.resolve(1, found("kept"));
        invoker.resolve(2, DecodeOutcome::Error(DecodeError::Backend("boom".into())));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.last_decoded_text.as_deref(), Some("kept"));
        assert_eq!(snapshot.last_error.as_deref(), Some("decoder backend failed: boom"));
    }

    #[test]
    fn outcomes_after_cancel_are_dropped() {
        let (invoker, state) = invoker(NotFoundPolicy::PreserveLast, DecodeScheduling::LatestTick);
        invoker.cancel.cancel();
        assert!(!invoker.resolve(1, found("late")));
        assert_eq!(state.snapshot().last_decoded_text, None);
        assert!(invoker.submit(2, RgbaImage::new(4, 4)).is_none());
    }

    #[tokio::test]
    async fn serialized_skips_while_busy() {
        let (invoker, state) = invoker(NotFoundPolicy::PreserveLast, DecodeScheduling::Serialized);
        invoker.in_flight.store(1, Ordering::SeqCst);
        assert!(invoker.submit(1, RgbaImage::new(4, 4)).is_none());

        invoker.in_flight.store(0, Ordering::SeqCst);
        let handle = invoker.submit(2, RgbaImage::new(4, 4)).expect("submitted");
        handle.await.unwrap();
        assert_eq!(invoker.in_flight(), 0);
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("0123456789"));
    }

    #[tokio::test]
    async fn submit_runs_decoder_and_applies() {
        let (invoker, state) = invoker(NotFoundPolicy::PreserveLast, DecodeScheduling::LatestTick);
        let first = invoker.submit(1, RgbaImage::new(4, 4)).unwrap();
        let second = invoker.submit(2, RgbaImage::new(4, 4)).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(invoker.in_flight(), 0);
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("0123456789"));
    }

    /// Narrow frames block until released and read "older"; wide ones read "newer" at once.
    struct Gated(Mutex<std::sync::mpsc::Receiver<()>>);

    impl BarcodeDecoder for Gated {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn decode(&self, image: &RgbaImage) -> Result<Option<String>, DecodeError> {
            if image.width() == 1 {
                let release = self.0.lock().unwrap();
                release.recv().map_err(|e| DecodeError::Backend(e.to_string()))?;
                return Ok(Some("older".to_string()));
            }
            Ok(Some("newer".to_string()))
        }
    }

    #[tokio::test]
    async fn overlapping_submits_keep_the_newest_tick() {
        let (release, gate) = std::sync::mpsc::channel();
        let state = ScannerState::new();
        let invoker = DecodeInvoker::new(
            Arc::new(Gated(Mutex::new(gate))),
            NotFoundPolicy::PreserveLast,
            DecodeScheduling::LatestTick,
            state.clone(),
            CancellationToken::new(),
        );

        let older = invoker.submit(1, RgbaImage::new(1, 1)).expect("tick 1 submitted");
        let newer = invoker.submit(2, RgbaImage::new(2, 1)).expect("tick 2 submitted");
        newer.await.unwrap();
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("newer"));
        assert_eq!(invoker.in_flight(), 1);

        release.send(()).unwrap();
        older.await.unwrap();
        assert_eq!(state.snapshot().last_decoded_text.as_deref(), Some("newer"));
        assert_eq!(invoker.in_flight(), 0);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("clear".parse::<NotFoundPolicy>().unwrap(), NotFoundPolicy::ClearOnMiss);
        assert_eq!(
            "preserve_last".parse::<NotFoundPolicy>().unwrap(),
            NotFoundPolicy::PreserveLast
        );
        assert_eq!(
            "serialized".parse::<DecodeScheduling>().unwrap(),
            DecodeScheduling::Serialized
        );
        assert!("sometimes".parse::<DecodeScheduling>().is_err());
    }
}
