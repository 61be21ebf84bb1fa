//! World-frame placement of the depth sensor.
//!
//! A depth point travels depth frame → tracking frame (extrinsic) → world
//! frame (pose), so the composed transform is `pose * extrinsic`.

use glam::{Mat4, Quat, Vec3};
use tether_data::{ExtrinsicTransform, Pose};

/// Transform handed to the renderer for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldTransform {
    rotation: Quat,
    translation: Vec3,
    world_from_depth: Mat4,
}

impl WorldTransform {
    /// Depth-frame coordinates to world coordinates.
    pub fn matrix(&self) -> Mat4 {
        self.world_from_depth
    }

    /// World orientation of the tracking sensor.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// World position of the tracking sensor.
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    /// World pose of the tracking sensor as a matrix.
    pub fn world_from_tracking(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// World position of the depth sensor (the camera frustum apex).
    pub fn depth_origin(&self) -> Vec3 {
        self.world_from_depth.w_axis.truncate()
    }

    pub fn transform_point(&self, depth_point: Vec3) -> Vec3 {
        self.world_from_depth.transform_point3(depth_point)
    }

    /// Column-major storage.
    pub fn to_cols_array(&self) -> [f32; 16] {
        self.world_from_depth.to_cols_array()
    }
}

/// Compose the (predicted) pose with the extrinsic.
pub fn project(pose: &Pose, extrinsic: &ExtrinsicTransform) -> WorldTransform {
    let world_from_tracking = Mat4::from_rotation_translation(pose.rotation, pose.translation);
    WorldTransform {
        rotation: pose.rotation,
        translation: pose.translation,
        world_from_depth: world_from_tracking * extrinsic.matrix(),
    }
}
