//! Renderer boundary.
//!
//! The fusion loop does not rasterize anything itself. Each frame it hands
//! a [`RenderFrame`] to a [`FrameRenderer`], which owns whatever window,
//! GPU and view state it needs. Frames borrow the driver's state, so a
//! renderer cannot keep references past the call.

use crate::project::WorldTransform;
use tether_data::{ExtrinsicTransform, PointCloud, Pose, TextureImage};
use thiserror::Error;

/// Errors raised by a renderer.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Renderer backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to draw one fused frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    /// Viewport width in pixels.
    pub width: u32,
    /// Viewport height in pixels.
    pub height: u32,
    /// Latest depth-derived cloud, in the depth sensor's frame.
    pub point_cloud: &'a PointCloud,
    /// Latest bound texture, if any device supplied one.
    pub texture: Option<&'a TextureImage>,
    /// Tracker pose at the cloud's capture time (or the raw pose when
    /// prediction is disabled).
    pub pose: &'a Pose,
    pub extrinsic: &'a ExtrinsicTransform,
    /// `pose * extrinsic`: depth frame to world.
    pub world: WorldTransform,
    /// Offset the pose was extrapolated by.
    pub delta_seconds: f64,
}

/// A sink for fused frames, e.g. a window.
pub trait FrameRenderer {
    /// False once the user closed the window. Ends the fusion loop.
    fn is_open(&self) -> bool;

    /// Current viewport size (width, height).
    fn viewport(&self) -> (u32, u32);

    /// Draw one frame.
    fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), RenderError>;
}
