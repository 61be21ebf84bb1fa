//! Device boundary: enumeration, pipelines, and the frames they yield.

use image::{GrayImage, RgbImage};
use std::fmt;
use std::time::Duration;
use tether_data::{DataError, PointCloud, Pose, TextureImage};
use thiserror::Error;

/// Errors surfaced by the device layer.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to start device {serial}: {reason}")]
    StartFailed { serial: String, reason: String },

    #[error("Stream fault on device {serial}: {reason}")]
    StreamFault { serial: String, reason: String },

    #[error("Device {0} is stopped")]
    Stopped(String),

    #[error("Invalid frame data: {0}")]
    InvalidData(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub serial: String,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(serial: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.serial)
    }
}

/// Position of a pipeline in the aggregator's polling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub usize);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline#{}", self.0)
    }
}

/// Frames a pipeline delivered in one wait. Any stream may be absent.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    pub color: Option<RgbImage>,
    pub infrared: Option<GrayImage>,
    pub point_cloud: Option<PointCloud>,
    pub pose: Option<Pose>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, image: RgbImage) -> Self {
        self.color = Some(image);
        self
    }

    pub fn with_infrared(mut self, image: GrayImage) -> Self {
        self.infrared = Some(image);
        self
    }

    pub fn with_point_cloud(mut self, cloud: PointCloud) -> Self {
        self.point_cloud = Some(cloud);
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = Some(pose);
        self
    }

    /// Whether any texture is present (color or infrared).
    pub fn has_texture(&self) -> bool {
        self.color.is_some() || self.infrared.is_some()
    }

    /// Take the texture to bind, preferring color over infrared.
    ///
    /// Devices without a color sensor are textured with infrared instead.
    pub fn take_texture(&mut self) -> Option<TextureImage> {
        if let Some(color) = self.color.take() {
            return Some(TextureImage::Color(color));
        }
        self.infrared.take().map(TextureImage::Infrared)
    }

    pub fn is_empty(&self) -> bool {
        !self.has_texture() && self.point_cloud.is_none() && self.pose.is_none()
    }
}

/// A frame set tagged with the pipeline it came from.
#[derive(Debug, Clone)]
pub struct FrameBundle {
    pub pipeline: PipelineId,
    pub frames: FrameSet,
}

/// A started capture pipeline on one device.
///
/// Pipelines run on their own clocks; timestamps of different pipelines
/// are not comparable beyond whatever time domain the devices share.
pub trait DevicePipeline {
    /// The device this pipeline streams from.
    fn info(&self) -> &DeviceInfo;

    /// Block until the next frame set arrives. There is no timeout: a
    /// disconnected device blocks the caller indefinitely.
    fn wait_for_frames(&mut self) -> Result<FrameSet, DeviceError>;

    /// Wait at most `timeout` for the next frame set.
    ///
    /// Returns `Ok(None)` if nothing arrived in time. Pipelines that cannot
    /// time out fall back to blocking.
    fn try_wait_for_frames(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<FrameSet>, DeviceError> {
        self.wait_for_frames().map(Some)
    }

    /// Stop streaming. Further waits return [`DeviceError::Stopped`].
    fn stop(&mut self) {}
}

/// Discovers devices and starts pipelines with their default configuration.
pub trait DeviceProvider {
    /// List currently connected devices.
    fn query_devices(&mut self) -> Result<Vec<DeviceInfo>, DeviceError>;

    /// Start streaming from `device` with the default stream configuration.
    fn start(&mut self, device: &DeviceInfo) -> Result<Box<dyn DevicePipeline>, DeviceError>;
}
