//! Headless renderer that logs each fused frame instead of drawing it.

use glam::Vec3;
use tether_fusion::{FrameRenderer, RenderError, RenderFrame};
use tracing::{debug, info};

/// Axis-aligned bounds of the world-space cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl WorldBounds {
    /// Bounds of `positions`, or `None` for an empty cloud.
    pub fn from_positions(positions: impl Iterator<Item = Vec3>) -> Option<Self> {
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let mut count = 0usize;

        for pos in positions {
            min = min.min(pos);
            max = max.max(pos);
            count += 1;
        }

        (count > 0).then_some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

/// Stands in for the viewer window. "Closes" after a fixed number of frames.
pub struct TraceRenderer {
    frame_limit: u64,
    frames: u64,
    viewport: (u32, u32),
}

impl TraceRenderer {
    /// `frame_limit == 0` keeps the renderer open until the process is
    /// stopped.
    pub fn new(frame_limit: u64) -> Self {
        Self {
            frame_limit,
            frames: 0,
            viewport: (1280, 720),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameRenderer for TraceRenderer {
    fn is_open(&self) -> bool {
        self.frame_limit == 0 || self.frames < self.frame_limit
    }

    fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    fn draw(&mut self, frame: &RenderFrame<'_>) -> Result<(), RenderError> {
        let bounds = WorldBounds::from_positions(
            frame
                .point_cloud
                .positions()
                .map(|p| frame.world.transform_point(p)),
        );

        if self.frames == 0 {
            info!(
                "First fused frame: {} points, texture {:?}",
                frame.point_cloud.len(),
                frame.texture.map(|t| t.dimensions())
            );
        }

        debug!(
            frame = frame.point_cloud.frame_number(),
            dt = frame.delta_seconds,
            confidence = ?frame.pose.tracker_confidence,
            "depth origin {:?}, rotation {:?}, bounds {:?}",
            frame.world.depth_origin(),
            frame.world.rotation(),
            bounds.map(|b| (b.min, b.max))
        );

        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use tether_data::{ExtrinsicTransform, PointCloud, Pose, TextureCoordinate, Vertex};
    use tether_fusion::project;

    #[test]
    fn test_bounds() {
        let bounds = WorldBounds::from_positions(
            [Vec3::new(-1.0, 0.0, 2.0), Vec3::new(3.0, -2.0, 0.0)].into_iter(),
        )
        .unwrap();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(3.0, 0.0, 2.0));
        assert_eq!(bounds.center(), Vec3::new(1.0, -1.0, 1.0));
        assert!(WorldBounds::from_positions(std::iter::empty()).is_none());
    }

    #[test]
    fn test_closes_after_frame_limit() {
        let cloud = PointCloud::new(
            vec![Vertex::new(0.0, 0.0, 1.0)],
            vec![TextureCoordinate::new(0.0, 0.0)],
            10.0,
            1,
        )
        .unwrap();
        let pose = Pose::new(Vec3::ZERO, Quat::IDENTITY, 10.0);
        let extrinsic = ExtrinsicTransform::default();
        let frame = RenderFrame {
            width: 1280,
            height: 720,
            point_cloud: &cloud,
            texture: None,
            pose: &pose,
            extrinsic: &extrinsic,
            world: project(&pose, &extrinsic),
            delta_seconds: 0.0,
        };

        let mut renderer = TraceRenderer::new(2);
        assert!(renderer.is_open());
        renderer.draw(&frame).unwrap();
        renderer.draw(&frame).unwrap();
        assert!(!renderer.is_open());
        assert_eq!(renderer.frames(), 2);

        assert!(TraceRenderer::new(0).is_open());
    }
}
