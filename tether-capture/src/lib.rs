//! Tether Capture - Frame acquisition from one or more devices
//!
//! This crate defines the boundary between the fusion core and the device
//! layer, and aggregates frames from every connected device:
//!
//! - [`DeviceProvider`] / [`DevicePipeline`]: enumerate devices and poll the
//!   next frame set from each one
//! - [`StreamAggregator`]: owns one started pipeline per device and polls
//!   them round-robin
//! - [`scripted`]: pipelines that replay a fixed list of frame sets
//! - [`simulated`]: a tracking + depth rig on a known trajectory, used when
//!   no hardware is attached
//! - Webcams (via nokhwa, requires `webcam` feature), color texture only
//!
//! ## Example
//!
//! ```ignore
//! use tether_capture::{StreamAggregator, simulated::SimulatedProvider};
//!
//! let mut provider = SimulatedProvider::tracking_and_depth(Default::default());
//! let mut aggregator = StreamAggregator::enumerate_and_start(&mut provider)?;
//! for bundle in aggregator.poll_all()? {
//!     // Merge bundle...
//! }
//! ```

mod aggregator;
mod device;
pub mod scripted;
pub mod simulated;

#[cfg(feature = "webcam")]
mod webcam;

pub use aggregator::StreamAggregator;
pub use device::{
    DeviceError, DeviceInfo, DevicePipeline, DeviceProvider, FrameBundle, FrameSet, PipelineId,
};

#[cfg(feature = "webcam")]
pub use webcam::{WebcamPipeline, WebcamProvider};

// Re-export data types for convenience
pub use tether_data::{PointCloud, Pose, TextureImage};
