//! Tether Data Crate
//!
//! Sensor-side data types shared by device pipelines and the fusion core:
//! pose samples, depth-derived point clouds, texture images, and the fixed
//! extrinsic transform relating the tracking and depth sensors.
//! This crate is device-agnostic and performs no rendering.

pub mod calibration;
pub mod types;

pub use calibration::{
    CalibrationError, DEFAULT_CALIBRATION_FILE, ExtrinsicTransform, column_major_index,
    row_major_to_column_major,
};
pub use types::{Confidence, DataError, PointCloud, Pose, TextureCoordinate, TextureImage, Vertex};
