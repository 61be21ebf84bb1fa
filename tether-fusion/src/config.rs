//! Runtime configuration for the fusion loop.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_data::{DEFAULT_CALIBRATION_FILE, ExtrinsicTransform};
use thiserror::Error;
use tracing::info;

/// Errors from reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Fusion loop settings. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Extrinsic calibration file (16 row-major values).
    pub calibration_path: PathBuf,
    /// Add the acceleration terms when extrapolating the pose.
    pub include_acceleration: bool,
    /// Extrapolate the pose to the depth timestamp. When false the raw
    /// latest pose is rendered.
    pub predict_pose: bool,
    /// Bound each device poll. `None` blocks until the device delivers.
    pub poll_timeout_ms: Option<u64>,
    /// Stop with an error when a pose has a non-finite translation.
    pub abort_on_nonfinite_pose: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            calibration_path: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            include_acceleration: false,
            predict_pose: true,
            poll_timeout_ms: None,
            abort_on_nonfinite_pose: false,
        }
    }
}

impl FusionConfig {
    /// Read a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }

    /// Load the extrinsic named by `calibration_path`, falling back to the
    /// default transform.
    pub fn load_extrinsic(&self) -> ExtrinsicTransform {
        ExtrinsicTransform::load(&self.calibration_path)
    }
}
