use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::error::AcquireError;

/// Symbolic camera direction used when no specific device can be named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

impl fmt::Display for FacingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacingMode::Environment => f.write_str("environment"),
            FacingMode::User => f.write_str("user"),
        }
    }
}

impl FromStr for FacingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(anyhow!("unknown facing mode '{}'", other)),
        }
    }
}

/// One enumerable video input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    /// Stable identifier. Some environments withhold it.
    pub id: Option<String>,
    pub label: String,
    pub facing: Option<FacingMode>,
}

/// What to ask the provider for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamConstraints {
    /// Exactly this device.
    Device(String),
    /// Any device facing this way.
    Facing(FacingMode),
}

impl fmt::Display for StreamConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamConstraints::Device(id) => write!(f, "device '{id}'"),
            StreamConstraints::Facing(mode) => write!(f, "facing {mode}"),
        }
    }
}

/// How the session picks its constraints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSelection {
    /// Skip enumeration and request by facing preference.
    #[default]
    FacingOnly,
    /// Enumerate first and request a specific device when one can be named.
    Enumerate,
}

impl FromStr for DeviceSelection {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "facing" | "facing_only" => Ok(DeviceSelection::FacingOnly),
            "enumerate" => Ok(DeviceSelection::Enumerate),
            other => Err(anyhow!("unknown device selection '{}'", other)),
        }
    }
}

/// Resolve the constraints for a stream request.
///
/// With `Enumerate`, an empty device list is `NoDeviceFound`. A configured device id
/// wins when it is listed; otherwise the first device is used. A chosen device without
/// an identifier falls back to the facing preference.
pub fn select_constraints(
    selection: DeviceSelection,
    devices: &[DeviceDescriptor],
    preferred_id: Option<&str>,
    facing: FacingMode,
) -> Result<StreamConstraints, AcquireError> {
    if selection == DeviceSelection::FacingOnly {
        return Ok(StreamConstraints::Facing(facing));
    }

    if devices.is_empty() {
        return Err(AcquireError::NoDeviceFound);
    }

    if let Some(wanted) = preferred_id {
        if devices.iter().any(|d| d.id.as_deref() == Some(wanted)) {
            return Ok(StreamConstraints::Device(wanted.to_string()));
        }
        log::warn!(
            "configured camera '{}' not present among {} device(s); using first device",
            wanted,
            devices.len()
        );
    }

    match devices[0].id.as_deref() {
        Some(id) if !id.is_empty() => Ok(StreamConstraints::Device(id.to_string())),
        _ => Ok(StreamConstraints::Facing(facing)),
    }
}
