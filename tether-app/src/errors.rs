//! Error types for the tether binary.

use tether_capture::DeviceError;
use tether_fusion::{ConfigError, FusionError};
use thiserror::Error;

/// Process exit code for a non-finite pose fault.
pub const EXIT_NONFINITE_POSE: i32 = 2;
/// Process exit code for a device or SDK failure.
pub const EXIT_DEVICE: i32 = 3;

/// Errors that end the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error("Webcam capture requested but tether was built without the `webcam` feature")]
    WebcamUnavailable,
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Fusion(FusionError::NonFinitePose { .. }) => EXIT_NONFINITE_POSE,
            AppError::Device(_) | AppError::Fusion(FusionError::Device(_)) => EXIT_DEVICE,
            _ => 1,
        }
    }
}
