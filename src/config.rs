use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::decode::{DecodeScheduling, NotFoundPolicy};
use crate::geometry::{CropBounds, CropConfig};
use crate::ingest::{DeviceSelection, FacingMode};

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_DECODER: &str = "marker";
const DEFAULT_ASPECT_RATIO: f64 = 3.0 / 2.0;
const CROPPER_SIZE_FACTOR: f64 = 0.4;
const CROPPER_TICK_MS: u64 = 100;
const CONTINUOUS_TICK_MS: u64 = 500;
const DEFAULT_METADATA_POLL_MS: u64 = 20;
const CROPPER_BOUNDS: CropBounds = CropBounds {
    min_width: 240,
    max_width: 600,
    min_height: 80,
    max_height: 400,
};

/// Named pipeline variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Fast, bounded crop around the frame center. Keeps the last hit on a miss.
    #[default]
    Cropper,
    /// Slower sampling of the whole aspect-constrained frame. Clears on every miss.
    Continuous,
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cropper" => Ok(Preset::Cropper),
            "continuous" => Ok(Preset::Continuous),
            other => Err(anyhow!("unknown preset '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct ScannerConfigFile {
    preset: Option<Preset>,
    source: Option<String>,
    decoder: Option<String>,
    tick_ms: Option<u64>,
    metadata_poll_ms: Option<u64>,
    not_found: Option<NotFoundPolicy>,
    scheduling: Option<DecodeScheduling>,
    crop: Option<CropConfigFile>,
    device: Option<DeviceConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CropConfigFile {
    aspect_ratio: Option<f64>,
    size_factor: Option<f64>,
    bounds: Option<CropBounds>,
    /// Drop the preset's bounds.
    #[serde(default)]
    unbounded: bool,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceConfigFile {
    selection: Option<DeviceSelection>,
    id: Option<String>,
    facing: Option<FacingMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    pub preset: Preset,
    /// Camera source: `stub://...`, a local image path, or a V4L2 device.
    pub source: String,
    /// Registered decoder name.
    pub decoder: String,
    pub crop: CropConfig,
    pub tick_interval: Duration,
    /// Poll interval while waiting for the sink to report frame dimensions.
    pub metadata_poll: Duration,
    pub not_found: NotFoundPolicy,
    pub scheduling: DecodeScheduling,
    pub device_selection: DeviceSelection,
    pub device_id: Option<String>,
    pub facing: FacingMode,
}

impl ScannerConfig {
    pub fn for_preset(preset: Preset) -> Self {
        let base = Self {
            preset,
            source: DEFAULT_SOURCE.to_string(),
            decoder: DEFAULT_DECODER.to_string(),
            crop: CropConfig::new(DEFAULT_ASPECT_RATIO, CROPPER_SIZE_FACTOR)
                .with_bounds(CROPPER_BOUNDS),
            tick_interval: Duration::from_millis(CROPPER_TICK_MS),
            metadata_poll: Duration::from_millis(DEFAULT_METADATA_POLL_MS),
            not_found: NotFoundPolicy::PreserveLast,
            scheduling: DecodeScheduling::LatestTick,
            device_selection: DeviceSelection::FacingOnly,
            device_id: None,
            facing: FacingMode::Environment,
        };
        match preset {
            Preset::Cropper => base,
            Preset::Continuous => Self {
                crop: CropConfig::new(DEFAULT_ASPECT_RATIO, 1.0),
                tick_interval: Duration::from_millis(CONTINUOUS_TICK_MS),
                not_found: NotFoundPolicy::ClearOnMiss,
                device_selection: DeviceSelection::Enumerate,
                ..base
            },
        }
    }

    /// Load from `CROPSCAN_CONFIG` (JSON, or TOML by extension) and environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_with_preset(None)
    }

    /// Like `load`, but `preset` (when given) picks the base layer over
    /// `CROPSCAN_PRESET` and the file's `preset`. File and env settings still apply.
    pub fn load_with_preset(preset: Option<Preset>) -> Result<Self> {
        let config_path = std::env::var("CROPSCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default(), preset)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScannerConfigFile, preset: Option<Preset>) -> Result<Self> {
        let preset = match (preset, std::env::var("CROPSCAN_PRESET")) {
            (Some(preset), _) => preset,
            (None, Ok(value)) if !value.trim().is_empty() => value.parse()?,
            _ => file.preset.unwrap_or_default(),
        };
        let mut cfg = Self::for_preset(preset);

        if let Some(source) = file.source {
            cfg.source = source;
        }
        if let Some(decoder) = file.decoder {
            cfg.decoder = decoder;
        }
        if let Some(ms) = file.tick_ms {
            cfg.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = file.metadata_poll_ms {
            cfg.metadata_poll = Duration::from_millis(ms);
        }
        if let Some(policy) = file.not_found {
            cfg.not_found = policy;
        }
        if let Some(scheduling) = file.scheduling {
            cfg.scheduling = scheduling;
        }
        if let Some(crop) = file.crop {
            if let Some(ratio) = crop.aspect_ratio {
                cfg.crop.aspect_ratio = ratio;
            }
            if let Some(factor) = crop.size_factor {
                cfg.crop.size_factor = factor;
            }
            if crop.unbounded {
                cfg.crop.bounds = None;
            }
            if let Some(bounds) = crop.bounds {
                cfg.crop.bounds = Some(bounds);
            }
        }
        if let Some(device) = file.device {
            if let Some(selection) = device.selection {
                cfg.device_selection = selection;
            }
            if let Some(facing) = device.facing {
                cfg.facing = facing;
            }
            cfg.device_id = device.id.or(cfg.device_id);
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("CROPSCAN_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(id) = std::env::var("CROPSCAN_DEVICE_ID") {
            if !id.trim().is_empty() {
                self.device_id = Some(id);
                self.device_selection = DeviceSelection::Enumerate;
            }
        }
        if let Ok(facing) = std::env::var("CROPSCAN_FACING") {
            self.facing = facing.parse()?;
        }
        if let Ok(policy) = std::env::var("CROPSCAN_NOT_FOUND") {
            self.not_found = policy.parse()?;
        }
        if let Ok(scheduling) = std::env::var("CROPSCAN_SCHEDULING") {
            self.scheduling = scheduling.parse()?;
        }
        if let Ok(tick) = std::env::var("CROPSCAN_TICK_MS") {
            let ms: u64 = tick
                .parse()
                .map_err(|_| anyhow!("CROPSCAN_TICK_MS must be an integer number of milliseconds"))?;
            self.tick_interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.crop.validate()?;
        if self.tick_interval.is_zero() {
            return Err(anyhow!("tick interval must be greater than zero"));
        }
        if self.metadata_poll.is_zero() {
            return Err(anyhow!("metadata poll interval must be greater than zero"));
        }
        if self.source.trim().is_empty() {
            return Err(anyhow!("camera source must not be empty"));
        }
        Ok(())
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self::for_preset(Preset::default())
    }
}

fn read_config_file(path: &Path) -> Result<ScannerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
