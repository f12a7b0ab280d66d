use thiserror::Error;

/// Failure to obtain a camera stream from a media source provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no video input device found")]
    NoDeviceFound,
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

impl AcquireError {
    /// Message surfaced to the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            AcquireError::PermissionDenied => {
                "Unable to access the camera. Please check permissions.".to_string()
            }
            AcquireError::NoDeviceFound => "No video input devices found.".to_string(),
            AcquireError::Unavailable(reason) => format!("Camera unavailable: {reason}"),
        }
    }
}

/// Decoder failure unrelated to "no barcode present".
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("decoder backend failed: {0}")]
    Backend(String),
    #[error("corrupt barcode payload: {0}")]
    Corrupt(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors returned by `SessionController::start`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error("scanning session already active")]
    AlreadyActive,
    #[error("session stopped before the camera became available")]
    Cancelled,
}
