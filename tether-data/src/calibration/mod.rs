//! Extrinsic calibration between the tracking and depth sensors

mod extrinsic;
mod loader;

pub use extrinsic::{ExtrinsicTransform, column_major_index, row_major_to_column_major};
pub use loader::{CalibrationError, DEFAULT_CALIBRATION_FILE};
